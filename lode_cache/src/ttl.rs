use crate::error::CacheError;
use derivative::Derivative;
use lode_containers::prelude::{DefaultSlot, SlotMap};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Configuration for [`TtlCache`]
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Accumulated seconds between two liveness sweeps
    pub check_delay: f64,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self { check_delay: 100.0 }
    }
}

impl TtlCacheConfig {
    pub fn with_check_delay(mut self, check_delay: f64) -> Self {
        self.check_delay = check_delay;
        self
    }
}

/// A single cached resource.
///
/// The entry outlives its removal from the key index for as long as an [`EntryHandle`] to it
/// exists, which is what allows an entry freed by TTL to be revived by [`TtlCache::touch`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CacheEntry<T> {
    key: String,
    #[derivative(Debug = "ignore")]
    payload: T,
    touch_tick: u64,
    touch_seconds: f64,
    ttl_ticks: u64,
    ttl_seconds: f64,
    cached: bool,
    freed_by_ttl: bool,
    #[derivative(Debug = "ignore")]
    holders: Weak<()>,
}

impl<T> CacheEntry<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn touch_tick(&self) -> u64 {
        self.touch_tick
    }

    pub fn touch_seconds(&self) -> f64 {
        self.touch_seconds
    }

    pub fn ttl_ticks(&self) -> u64 {
        self.ttl_ticks
    }

    pub fn ttl_seconds(&self) -> f64 {
        self.ttl_seconds
    }

    /// Whether the entry is currently reachable through its key
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn is_freed_by_ttl(&self) -> bool {
        self.freed_by_ttl
    }
}

/// Handle to an entry of a [`TtlCache`].
///
/// Holding a handle keeps the entry's storage alive after it has been freed.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct EntryHandle<T> {
    slot: DefaultSlot<CacheEntry<T>>,
    #[derivative(Debug = "ignore")]
    holder: Rc<()>,
}

impl<T> Clone for EntryHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            holder: self.holder.clone(),
        }
    }
}

impl<T> PartialEq for EntryHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for EntryHandle<T> {}

/// Key to entry cache where entries expire by ticks and/or seconds since their last touch.
///
/// Both clocks are advanced by the host through [`TtlCache::tick`]. The O(n) liveness sweep only
/// runs once [`TtlCacheConfig::check_delay`] seconds have accumulated since the previous one.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TtlCache<T> {
    #[derivative(Debug = "ignore")]
    entries: SlotMap<CacheEntry<T>>,
    index: HashMap<String, DefaultSlot<CacheEntry<T>>>,
    update_ticks: u64,
    update_seconds: f64,
    last_check: f64,
    config: TtlCacheConfig,
    /// Scratch buffer reused between sweeps
    #[derivative(Debug = "ignore")]
    removed: Vec<DefaultSlot<CacheEntry<T>>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(TtlCacheConfig::default())
    }
}

impl<T> TtlCache<T> {
    pub fn new(config: TtlCacheConfig) -> Self {
        Self {
            entries: SlotMap::default(),
            index: HashMap::new(),
            update_ticks: 0,
            update_seconds: 0.0,
            last_check: 0.0,
            config,
            removed: Vec::new(),
        }
    }

    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    /// Current tick counter
    pub fn ticks(&self) -> u64 {
        self.update_ticks
    }

    /// Current wall clock counter, in seconds
    pub fn seconds(&self) -> f64 {
        self.update_seconds
    }

    /// Number of entries reachable by key
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of entries still backed by storage, including freed entries kept by a handle
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert `payload` under `key` and mark it live as of the current tick.
    ///
    /// An entry previously bound to `key` is freed, without the TTL marker.
    pub fn set_item(&mut self, key: impl Into<String>, payload: T) -> EntryHandle<T> {
        let key = key.into();
        if let Some(previous) = self.index.remove(&key) {
            if let Some(entry) = self.entries.get_mut(&previous) {
                entry.cached = false;
                entry.freed_by_ttl = false;
            }
        }
        let holder = Rc::new(());
        let slot = self.entries.insert(CacheEntry {
            key: key.clone(),
            payload,
            touch_tick: self.update_ticks,
            touch_seconds: self.update_seconds,
            ttl_ticks: 0,
            ttl_seconds: 0.0,
            cached: true,
            freed_by_ttl: false,
            holders: Rc::downgrade(&holder),
        });
        self.index.insert(key, slot);
        EntryHandle { slot, holder }
    }

    /// Payload stored under `key`, `None` on a miss
    pub fn get_item(&self, key: &str) -> Option<&T> {
        self.index
            .get(key)
            .and_then(|slot| self.entries.get(slot))
            .map(|entry| &entry.payload)
    }

    /// New handle to the entry currently bound to `key`
    pub fn handle(&mut self, key: &str) -> Option<EntryHandle<T>> {
        let slot = *self.index.get(key)?;
        let entry = self.entries.get_mut(&slot)?;
        let holder = entry.holders.upgrade().unwrap_or_else(|| {
            let holder = Rc::new(());
            entry.holders = Rc::downgrade(&holder);
            holder
        });
        Some(EntryHandle { slot, holder })
    }

    /// Entry behind `handle`, whether or not it is still cached
    pub fn entry(&self, handle: &EntryHandle<T>) -> Result<&CacheEntry<T>, CacheError> {
        self.entries.get(&handle.slot).ok_or(CacheError::StaleEntry)
    }

    /// Set the time to live of an entry. Zero disables expiry on that axis.
    pub fn set_time_to_live(
        &mut self,
        handle: &EntryHandle<T>,
        ticks: u64,
        seconds: f64,
    ) -> Result<(), CacheError> {
        let entry = self
            .entries
            .get_mut(&handle.slot)
            .ok_or(CacheError::StaleEntry)?;
        entry.ttl_ticks = ticks;
        entry.ttl_seconds = seconds;
        Ok(())
    }

    /// Whether `entry` has not outlived its time to live on either axis
    pub fn is_still_alive(&self, entry: &CacheEntry<T>) -> bool {
        (entry.ttl_ticks == 0
            || entry.touch_tick.saturating_add(entry.ttl_ticks) >= self.update_ticks)
            && (entry.ttl_seconds == 0.0
                || entry.touch_seconds + entry.ttl_seconds >= self.update_seconds)
    }

    /// Refresh the entry's timestamps, or revive it if it was freed by TTL.
    ///
    /// Returns whether the entry is cached afterwards. A revived entry does not displace another
    /// entry which has since been bound to the same key.
    pub fn touch(&mut self, handle: &EntryHandle<T>) -> Result<bool, CacheError> {
        let entry = self
            .entries
            .get_mut(&handle.slot)
            .ok_or(CacheError::StaleEntry)?;
        if entry.cached {
            entry.touch_tick = self.update_ticks;
            entry.touch_seconds = self.update_seconds;
            Ok(true)
        } else if entry.freed_by_ttl {
            entry.freed_by_ttl = false;
            if self.index.contains_key(&entry.key) {
                return Ok(false);
            }
            entry.cached = true;
            entry.touch_tick = self.update_ticks;
            entry.touch_seconds = self.update_seconds;
            self.index.insert(entry.key.clone(), handle.slot);
            tracing::trace!("Revived cache entry {}", entry.key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Explicitly evict an entry from the key index
    pub fn free(&mut self, handle: &EntryHandle<T>) -> Result<(), CacheError> {
        self.free_slot(handle.slot, false)
    }

    fn free_slot(
        &mut self,
        slot: DefaultSlot<CacheEntry<T>>,
        by_ttl: bool,
    ) -> Result<(), CacheError> {
        let entry = self.entries.get_mut(&slot).ok_or(CacheError::StaleEntry)?;
        entry.freed_by_ttl = by_ttl;
        if entry.cached {
            entry.cached = false;
            self.index.remove(&entry.key);
        }
        Ok(())
    }

    /// Advance both clocks. Sweeps when the check delay has elapsed, returns whether it did.
    pub fn tick(&mut self, ticks: u64, delta_seconds: f64) -> bool {
        self.update_ticks = self.update_ticks.saturating_add(ticks);
        self.update_seconds += delta_seconds;
        if self.update_seconds >= self.last_check + self.config.check_delay {
            self.last_check = self.update_seconds;
            self.check_ttl();
            true
        } else {
            false
        }
    }

    /// Free every cached entry which is no longer alive
    pub fn check_ttl(&mut self) {
        let mut removed = std::mem::take(&mut self.removed);
        removed.extend(self.index.values().copied().filter(|slot| {
            self.entries
                .get(slot)
                .is_some_and(|entry| !self.is_still_alive(entry))
        }));
        let expired = removed.len();
        for slot in removed.drain(..) {
            let _ = self.free_slot(slot, true);
        }
        self.removed = removed;
        let reclaimed = self.reclaim();
        tracing::debug!(
            "TTL sweep at tick {} ({:.2}s): {} expired, {} live, {} reclaimed",
            self.update_ticks,
            self.update_seconds,
            expired,
            self.index.len(),
            reclaimed
        );
    }

    /// Free every entry. Entries freed this way cannot be revived by touch.
    pub fn clear(&mut self) {
        let slots: Vec<_> = self.index.values().copied().collect();
        for slot in slots {
            let _ = self.free_slot(slot, false);
        }
        self.reclaim();
    }

    /// Drop storage of freed entries which no handle refers to anymore
    fn reclaim(&mut self) -> usize {
        let dead: Vec<_> = self
            .entries
            .iter_slots()
            .filter(|(_, entry)| !entry.cached && entry.holders.strong_count() == 0)
            .map(|(slot, _)| slot)
            .collect();
        for slot in dead.iter() {
            let _ = self.entries.remove(*slot);
        }
        dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<&'static str> {
        TtlCache::new(TtlCacheConfig::default().with_check_delay(1.0))
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = cache();
        let handle = cache.set_item("img/a.png", "a");
        assert_eq!(cache.get_item("img/a.png"), Some(&"a"));
        assert_eq!(cache.get_item("img/b.png"), None);
        let entry = cache.entry(&handle).unwrap();
        assert!(entry.is_cached());
        assert!(!entry.is_freed_by_ttl());
        assert_eq!(entry.key(), "img/a.png");
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let mut cache = cache();
        let _handle = cache.set_item("forever", "x");
        for _ in 0..100 {
            cache.tick(1000, 1000.0);
        }
        assert_eq!(cache.get_item("forever"), Some(&"x"));
    }

    #[test]
    fn test_tick_ttl_expires() {
        let mut cache = cache();
        let handle = cache.set_item("a", "a");
        cache.set_time_to_live(&handle, 10, 0.0).unwrap();

        // deadline is inclusive
        assert!(cache.tick(10, 1.0));
        assert_eq!(cache.get_item("a"), Some(&"a"));

        assert!(cache.tick(1, 1.0));
        assert_eq!(cache.get_item("a"), None);
        let entry = cache.entry(&handle).unwrap();
        assert!(!entry.is_cached());
        assert!(entry.is_freed_by_ttl());
    }

    #[test]
    fn test_seconds_ttl_expires() {
        let mut cache = cache();
        let handle = cache.set_item("a", "a");
        cache.set_time_to_live(&handle, 0, 5.0).unwrap();
        cache.tick(1, 5.0);
        assert!(cache.contains_key("a"));
        cache.tick(1, 1.0);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_any_expired_axis_frees() {
        let mut cache = cache();
        let handle = cache.set_item("a", "a");
        cache.set_time_to_live(&handle, 1000, 2.0).unwrap();
        cache.tick(1, 3.0);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_sweep_waits_for_check_delay() {
        let mut cache = TtlCache::new(TtlCacheConfig::default());
        let handle = cache.set_item("a", "a");
        cache.set_time_to_live(&handle, 1, 0.0).unwrap();
        for _ in 0..99 {
            assert!(!cache.tick(1, 1.0));
        }
        // expired long ago, but no sweep yet
        assert!(cache.contains_key("a"));
        assert!(cache.tick(1, 1.0));
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_touch_extends_lifetime() {
        let mut cache = cache();
        let handle = cache.set_item("a", "a");
        cache.set_time_to_live(&handle, 5, 0.0).unwrap();
        for _ in 0..20 {
            cache.tick(3, 1.0);
            assert!(cache.touch(&handle).unwrap());
        }
        assert!(cache.contains_key("a"));
        assert_eq!(cache.entry(&handle).unwrap().touch_tick(), 60);
    }

    #[test]
    fn test_touch_revives_ttl_freed_entry() {
        let mut cache = cache();
        let handle = cache.set_item("a", "payload");
        cache.set_time_to_live(&handle, 1, 0.0).unwrap();
        cache.tick(5, 1.0);
        assert_eq!(cache.get_item("a"), None);

        assert!(cache.touch(&handle).unwrap());
        assert_eq!(cache.get_item("a"), Some(&"payload"));
        let entry = cache.entry(&handle).unwrap();
        assert!(entry.is_cached());
        assert!(!entry.is_freed_by_ttl());

        // timestamps were refreshed, so the next sweep keeps it
        cache.tick(1, 1.0);
        assert_eq!(cache.get_item("a"), Some(&"payload"));
    }

    #[test]
    fn test_revival_does_not_displace_new_binding() {
        let mut cache = cache();
        let old = cache.set_item("a", "old");
        cache.set_time_to_live(&old, 1, 0.0).unwrap();
        cache.tick(5, 1.0);
        let _new = cache.set_item("a", "new");

        assert!(!cache.touch(&old).unwrap());
        assert_eq!(cache.get_item("a"), Some(&"new"));
        assert!(!cache.entry(&old).unwrap().is_freed_by_ttl());
    }

    #[test]
    fn test_clear_is_not_ttl_freed() {
        let mut cache = cache();
        let a = cache.set_item("a", "a");
        let b = cache.set_item("b", "b");
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.entry(&a).unwrap().is_freed_by_ttl());
        assert!(!cache.touch(&b).unwrap());
        assert!(cache.get_item("b").is_none());
    }

    #[test]
    fn test_set_item_replaces_previous() {
        let mut cache = cache();
        let first = cache.set_item("a", "first");
        let _second = cache.set_item("a", "second");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_item("a"), Some(&"second"));
        assert!(!cache.entry(&first).unwrap().is_cached());
        assert_eq!(cache.entry(&first).unwrap().payload(), &"first");
    }

    #[test]
    fn test_unheld_freed_entries_are_reclaimed() {
        let mut cache = cache();
        let held = cache.set_item("held", "h");
        cache.set_time_to_live(&held, 1, 0.0).unwrap();
        {
            let dropped = cache.set_item("dropped", "d");
            cache.set_time_to_live(&dropped, 1, 0.0).unwrap();
        }
        assert_eq!(cache.stored_len(), 2);
        cache.tick(5, 1.0);
        assert!(cache.is_empty());
        // only the entry with an outstanding handle keeps its storage
        assert_eq!(cache.stored_len(), 1);
        assert!(cache.entry(&held).is_ok());
    }

    #[test]
    fn test_handle_by_key() {
        let mut cache = cache();
        drop(cache.set_item("a", "a"));
        let handle = cache.handle("a").unwrap();
        assert!(cache.handle("b").is_none());
        cache.set_time_to_live(&handle, 1, 0.0).unwrap();
        cache.tick(5, 1.0);
        // storage survives the sweep through the new handle
        assert!(cache.touch(&handle).unwrap());
        assert_eq!(cache.get_item("a"), Some(&"a"));
    }

    #[test]
    fn test_clone_keeps_storage_alive() {
        let mut cache = cache();
        let handle = cache.set_item("a", "a");
        let clone = handle.clone();
        cache.free(&handle).unwrap();
        drop(handle);
        // the clone keeps it alive
        cache.tick(1, 1.0);
        assert!(cache.entry(&clone).is_ok());
    }

    #[test]
    fn test_huge_tick_ttl_never_expires() {
        let mut cache = TtlCache::new(TtlCacheConfig::default().with_check_delay(0.0));
        cache.tick(1, 1.0);
        let forever = cache.set_item("forever", "f");
        cache.set_time_to_live(&forever, u64::MAX, 0.0).unwrap();
        cache.tick(1, 1.0);
        cache.tick(1_000, 1.0);
        assert!(cache.entry(&forever).unwrap().is_cached());
        assert_eq!(cache.get_item("forever"), Some(&"f"));
    }

    #[test]
    fn test_sweep_matches_liveness_predicate() {
        let mut cache = TtlCache::new(TtlCacheConfig::default().with_check_delay(0.0));
        let mut handles = Vec::new();
        for i in 0..50u64 {
            let handle = cache.set_item(format!("k{i}"), "v");
            cache.set_time_to_live(&handle, i % 7, (i % 5) as f64).unwrap();
            handles.push(handle);
        }
        cache.tick(3, 2.5);
        for (i, handle) in handles.iter().enumerate() {
            let i = i as u64;
            let tick_expired = i % 7 != 0 && i % 7 < 3;
            let seconds_expired = i % 5 != 0 && ((i % 5) as f64) < 2.5;
            let expected_present = !(tick_expired || seconds_expired);
            assert_eq!(
                cache.entry(handle).unwrap().is_cached(),
                expected_present,
                "entry k{i}"
            );
            assert_eq!(cache.contains_key(&format!("k{i}")), expected_present);
        }
    }
}
