pub use super::error::ContainerErrors;
pub use super::slot::{DefaultSlot, Slot, SlotWithGeneration};
pub use super::slot_map::SlotMap;
