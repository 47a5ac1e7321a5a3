use derivative::Derivative;
use std::collections::HashMap;
use std::time::Instant;

/// What [`BudgetedImageCache`] needs to know about the items it holds
pub trait Budgeted {
    /// Budget consumed by the item, usually `width * height` of the decoded image.
    /// Items which are not ready yet cost nothing.
    fn cost(&self) -> u64;

    /// Whether the item is ready for use
    fn is_ready(&self) -> bool;

    /// Whether the item was only fetched, and is not meant to be kept around decoded
    fn is_request_only(&self) -> bool;

    fn is_error(&self) -> bool {
        false
    }
}

/// Configuration for [`BudgetedImageCache`]
#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    /// Total cost the unheld items may consume
    pub budget: u64,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            budget: 10 * 1000 * 1000,
        }
    }
}

impl ImageCacheConfig {
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageCacheItem<T> {
    key: String,
    #[derivative(Debug = "ignore")]
    item: T,
    last_touch: Instant,
    /// Breaks ties between touches within the same clock reading
    sequence: u64,
    reservation_id: Option<u64>,
}

impl<T> ImageCacheItem<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn item(&self) -> &T {
        &self.item
    }

    pub fn last_touch(&self) -> Instant {
        self.last_touch
    }

    pub fn reservation_id(&self) -> Option<u64> {
        self.reservation_id
    }
}

/// Cache bounded by the summed cost of its items rather than by time.
///
/// Eviction walks the items from most to least recently touched. An item is kept while its cost
/// still fits in the remaining budget, or when it must be held: reserved, not ready yet, or
/// request only. Once an unheld item does not fit, it and every older unheld item are evicted.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BudgetedImageCache<T> {
    items: HashMap<String, ImageCacheItem<T>>,
    config: ImageCacheConfig,
    sequence: u64,
}

impl<T: Budgeted> Default for BudgetedImageCache<T> {
    fn default() -> Self {
        Self::new(ImageCacheConfig::default())
    }
}

impl<T: Budgeted> BudgetedImageCache<T> {
    pub fn new(config: ImageCacheConfig) -> Self {
        Self {
            items: HashMap::new(),
            config,
            sequence: 0,
        }
    }

    pub fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Insert or replace `key`, then evict whatever no longer fits
    pub fn add(&mut self, key: impl Into<String>, item: T) {
        let key = key.into();
        let sequence = self.next_sequence();
        self.items.insert(
            key.clone(),
            ImageCacheItem {
                key,
                item,
                last_touch: Instant::now(),
                sequence,
                reservation_id: None,
            },
        );
        self.truncate();
    }

    /// Look up `key` and mark it as most recently used
    pub fn get(&mut self, key: &str) -> Option<&T> {
        let sequence = self.next_sequence();
        let cache_item = self.items.get_mut(key)?;
        cache_item.last_touch = Instant::now();
        cache_item.sequence = sequence;
        Some(&cache_item.item)
    }

    /// Look up `key` without refreshing it
    pub fn peek(&self, key: &str) -> Option<&ImageCacheItem<T>> {
        self.items.get(key)
    }

    /// Insert `key` if absent and pin it under `reservation_id`
    pub fn reserve(&mut self, key: impl Into<String>, item: T, reservation_id: u64) {
        let key = key.into();
        let sequence = self.next_sequence();
        self.items
            .entry(key.clone())
            .or_insert_with(|| ImageCacheItem {
                key,
                item,
                last_touch: Instant::now(),
                sequence,
                reservation_id: None,
            })
            .reservation_id = Some(reservation_id);
    }

    /// Unpin every item held under `reservation_id`
    pub fn release_reservation(&mut self, reservation_id: u64) {
        self.items
            .values_mut()
            .filter(|cache_item| cache_item.reservation_id == Some(reservation_id))
            .for_each(|cache_item| cache_item.reservation_id = None);
    }

    /// Whether every item which is meant to be decoded is ready
    pub fn is_ready(&self) -> bool {
        self.items
            .values()
            .all(|cache_item| cache_item.item.is_request_only() || cache_item.item.is_ready())
    }

    /// First item which failed to load
    pub fn error_item(&self) -> Option<&T> {
        self.items
            .values()
            .map(|cache_item| &cache_item.item)
            .find(|item| item.is_error())
    }

    /// Summed cost of every item
    pub fn consumed(&self) -> u64 {
        self.items.values().map(|cache_item| cache_item.item.cost()).sum()
    }

    fn must_be_held(cache_item: &ImageCacheItem<T>) -> bool {
        cache_item.reservation_id.is_some()
            || !cache_item.item.is_ready()
            || cache_item.item.is_request_only()
    }

    /// Run an eviction pass, returns the number of evicted items
    pub fn truncate(&mut self) -> usize {
        let mut by_recency: Vec<&ImageCacheItem<T>> = self.items.values().collect();
        by_recency.sort_by(|a, b| {
            b.last_touch
                .cmp(&a.last_touch)
                .then(b.sequence.cmp(&a.sequence))
        });

        let mut size_left = self.config.budget as i128;
        let mut exhausted = false;
        let mut evicted: Vec<String> = Vec::new();
        for cache_item in by_recency {
            let cost = cache_item.item.cost() as i128;
            if Self::must_be_held(cache_item) {
                size_left -= cost;
            } else if !exhausted && cost <= size_left {
                size_left -= cost;
            } else {
                exhausted = true;
                evicted.push(cache_item.key.clone());
            }
        }

        for key in evicted.iter() {
            self.items.remove(key);
        }
        if !evicted.is_empty() {
            tracing::debug!(
                "Evicted {} images over budget of {}",
                evicted.len(),
                self.config.budget
            );
        }
        evicted.len()
    }
}
