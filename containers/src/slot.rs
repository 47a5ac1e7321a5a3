use derivative::Derivative;
use std::marker::PhantomData;

/// Index into a container's indirection table
pub trait Slot: Clone {
    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);

    fn new(id: u64) -> Self;
}

/// A slot which can be invalidated by bumping its generation
pub trait SlotWithGeneration: Slot {
    fn generation(&self) -> u64;

    fn set_generation(&mut self, generation: u64);

    fn new_with_gen(id: u64, generation: u64) -> Self;
}

/// Typed slot, the marker keeps slots from different maps apart
#[derive(Derivative)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct DefaultSlot<T> {
    pub(crate) id: u64,
    pub(crate) generation: u64,
    #[derivative(Debug = "ignore", PartialEq = "ignore", Hash = "ignore")]
    _marker: PhantomData<T>,
}

impl<T> Clone for DefaultSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DefaultSlot<T> {}

impl<T> DefaultSlot<T> {
    pub fn new(id: u64, generation: u64) -> Self {
        Self {
            id,
            generation,
            _marker: PhantomData,
        }
    }
}

impl<T> Slot for DefaultSlot<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn new(id: u64) -> Self {
        DefaultSlot::new(id, 0)
    }
}

impl<T> SlotWithGeneration for DefaultSlot<T> {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    fn new_with_gen(id: u64, generation: u64) -> Self {
        DefaultSlot::new(id, generation)
    }
}
