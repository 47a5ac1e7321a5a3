//! Generation checked containers.
//!
//! A [`slot_map::SlotMap`] hands out slots which stay valid until the element is removed.
//! Removing bumps the generation of the indirection entry, so stale slots resolve to nothing
//! instead of aliasing whatever reuses the index.

pub mod error;
pub mod prelude;
pub mod slot;
pub mod slot_map;
