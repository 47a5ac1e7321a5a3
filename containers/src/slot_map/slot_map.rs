use crate::error::ContainerErrors;
use crate::slot::{DefaultSlot, Slot, SlotWithGeneration};
use std::slice::{Iter, IterMut};

/// Regular slot map implementation
///
/// Data is kept densely packed, `slots` is the indirection table the handed out slots point
/// into. Removal swaps the last element into the hole and patches its indirection entry.
#[derive(Debug, PartialEq, Eq)]
pub struct SlotMap<T, S: SlotWithGeneration = DefaultSlot<T>> {
    // u64 is a reference to the proxy slot index
    pub(crate) data: Vec<(T, u64)>,
    pub(crate) slots: Vec<S>,
    pub(crate) free_list: Vec<u64>,
}

impl<T, S: SlotWithGeneration> Default for SlotMap<T, S> {
    fn default() -> Self {
        Self {
            data: Default::default(),
            slots: Default::default(),
            free_list: Default::default(),
        }
    }
}

impl<T, S: SlotWithGeneration> SlotMap<T, S> {
    pub fn insert(&mut self, element: T) -> S {
        // find the next free slot for indirect
        let free_slot_index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(S::new_with_gen(0, 0));
                (self.slots.len() - 1) as u64
            }
        };
        let data_index = self.data.len() as u64;
        let free_slot = &mut self.slots[free_slot_index as usize];
        // update index the inner slot will point to
        free_slot.set_id(data_index);
        let generation = free_slot.generation();
        self.data.push((element, free_slot_index));

        S::new_with_gen(free_slot_index, generation)
    }

    pub fn remove(&mut self, slot: S) -> Result<T, ContainerErrors> {
        let proxy_slot = self
            .slots
            .get_mut(slot.id() as usize)
            .ok_or(ContainerErrors::NonexistentSlot)?;
        if slot.generation() != proxy_slot.generation() {
            return Err(ContainerErrors::GenerationMismatch);
        }
        // increment generation
        proxy_slot.set_generation(proxy_slot.generation() + 1);
        let data_index = proxy_slot.id() as usize;
        let last_index = self.data.len() - 1;
        if data_index != last_index {
            self.data.swap(last_index, data_index);
            // since we swapped, we must update the indirect to point to the data index
            let swapped_proxy = self.data[data_index].1;
            self.slots[swapped_proxy as usize].set_id(data_index as u64);
        }
        // to be removed must be last in data
        let (data, _) = self.data.pop().ok_or(ContainerErrors::NonexistentSlot)?;
        self.free_list.push(slot.id());
        Ok(data)
    }

    fn data_index(&self, slot: &S) -> Option<usize> {
        self.slots.get(slot.id() as usize).and_then(|proxy_slot| {
            if proxy_slot.generation() == slot.generation() {
                Some(proxy_slot.id() as usize)
            } else {
                None
            }
        })
    }

    pub fn contains(&self, slot: &S) -> bool {
        self.data_index(slot).is_some()
    }

    pub fn get(&self, slot: &S) -> Option<&T> {
        self.data_index(slot)
            .and_then(|index| self.data.get(index))
            .map(|data| &data.0)
    }

    pub fn get_mut(&mut self, slot: &S) -> Option<&mut T> {
        self.data_index(slot)
            .and_then(|index| self.data.get_mut(index))
            .map(|data| &mut data.0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, (T, u64)> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, (T, u64)> {
        self.data.iter_mut()
    }

    /// Iterate elements together with the slot that currently resolves to them
    pub fn iter_slots(&self) -> impl Iterator<Item = (S, &T)> {
        self.data.iter().map(|(element, proxy_index)| {
            let generation = self.slots[*proxy_index as usize].generation();
            (S::new_with_gen(*proxy_index, generation), element)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot = slot_map.insert(42);
        assert_eq!(slot_map.get(&slot), Some(&42));
    }

    #[test]
    fn test_insert_multiple_and_get() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot1 = slot_map.insert(42);
        let slot2 = slot_map.insert(43);
        let slot3 = slot_map.insert(44);

        assert_eq!(slot_map.get(&slot1), Some(&42));
        assert_eq!(slot_map.get(&slot2), Some(&43));
        assert_eq!(slot_map.get(&slot3), Some(&44));
    }

    #[test]
    fn test_remove() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot = slot_map.insert(42);
        let removed = slot_map.remove(slot).unwrap();
        assert_eq!(removed, 42);
        assert_eq!(slot_map.get(&slot), None);
        assert!(slot_map.is_empty());
    }

    #[test]
    fn test_remove_and_insert() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot1 = slot_map.insert(42);
        let slot2 = slot_map.insert(43);
        let _ = slot_map.remove(slot1).unwrap();
        let slot3 = slot_map.insert(44);

        // Since slot1 was removed, slot3 reuses that slot
        assert_eq!(slot3.id(), slot1.id());
        assert_eq!(slot3.generation(), slot1.generation() + 1);
        assert_eq!(slot_map.get(&slot2), Some(&43));
        assert_eq!(slot_map.get(&slot3), Some(&44));
    }

    #[test]
    fn test_generation_mismatch() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot = slot_map.insert(42);
        let _ = slot_map.remove(slot).unwrap();
        assert_eq!(slot_map.get(&slot), None);
        assert_eq!(slot_map.remove(slot), Err(ContainerErrors::GenerationMismatch));
    }

    #[test]
    fn test_nonexistent_slot() {
        let mut slot_map: SlotMap<i32> = SlotMap::default();
        let invalid_slot = DefaultSlot::new(999, 0);
        assert_eq!(
            slot_map.remove(invalid_slot),
            Err(ContainerErrors::NonexistentSlot)
        );
    }

    #[test]
    fn test_get_mut() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot = slot_map.insert(42);
        if let Some(value) = slot_map.get_mut(&slot) {
            *value = 100;
        }
        assert_eq!(slot_map.get(&slot), Some(&100));
    }

    #[test]
    fn test_iter_slots_resolve_back() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let a = slot_map.insert("a");
        let b = slot_map.insert("b");
        let c = slot_map.insert("c");
        slot_map.remove(a).unwrap();

        let collected: Vec<_> = slot_map.iter_slots().collect();
        assert_eq!(collected.len(), 2);
        for (slot, value) in collected {
            assert_eq!(slot_map.get(&slot), Some(value));
        }
        assert!(slot_map.contains(&b));
        assert!(slot_map.contains(&c));
        assert!(!slot_map.contains(&a));
    }

    #[test]
    fn test_large_number_of_elements() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let num_elements = 1000;
        let mut slots = Vec::new();

        for i in 0..num_elements {
            slots.push(slot_map.insert(i));
        }

        // Remove half of the elements
        for i in (0..num_elements).step_by(2) {
            let _ = slot_map.remove(slots[i]).unwrap();
        }

        for i in (0..num_elements).step_by(2) {
            assert_eq!(slot_map.get(&slots[i]), None);
        }
        for i in (1..num_elements).step_by(2) {
            assert_eq!(slot_map.get(&slots[i]), Some(&i));
        }
        assert_eq!(slot_map.len(), num_elements / 2);
    }

    #[test]
    fn test_remove_all_and_insert() {
        let mut slot_map: SlotMap<_> = SlotMap::default();
        let slot1 = slot_map.insert(1);
        let slot2 = slot_map.insert(2);

        let _ = slot_map.remove(slot1).unwrap();
        let _ = slot_map.remove(slot2).unwrap();

        let slot3 = slot_map.insert(3);
        let slot4 = slot_map.insert(4);

        // free list is LIFO
        assert_eq!(slot3.id(), slot2.id());
        assert_eq!(slot4.id(), slot1.id());
        assert_eq!(slot3.generation(), slot2.generation() + 1);
        assert_eq!(slot4.generation(), slot1.generation() + 1);

        assert_eq!(slot_map.get(&slot3), Some(&3));
        assert_eq!(slot_map.get(&slot4), Some(&4));
    }

    #[test]
    fn test_empty_slot_map() {
        let slot_map: SlotMap<i32> = SlotMap::default();
        assert_eq!(slot_map.data.len(), 0);
        assert_eq!(slot_map.slots.len(), 0);
        assert_eq!(slot_map.free_list.len(), 0);
    }
}
