use crate::config::LoaderConfig;
use crate::context::LoaderContext;
use crate::error::TransformError;
use crate::queue::RequestQueue;
use crate::retry::{FailureRegistry, RetryScheduler};
use crate::transform::ByteTransform;
use crate::transport::Transport;
use crate::unit::LoadUnit;
use lode_cache::{BudgetedImageCache, CacheError, EntryHandle, TtlCache};
use std::rc::Rc;
use std::time::Duration;

/// Owns the caches, the request queue and the retry machinery of one loader.
///
/// Every public call returns immediately. Progress only happens in [`ResourceManager::update`],
/// which the host calls once per frame.
#[derive(Debug)]
pub struct ResourceManager {
    ctx: Rc<LoaderContext>,
    ttl_cache: TtlCache<LoadUnit>,
    image_cache: BudgetedImageCache<LoadUnit>,
    queue: RequestQueue<LoadUnit>,
    config: LoaderConfig,
}

impl ResourceManager {
    pub fn new(
        config: LoaderConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, TransformError> {
        let transform = ByteTransform::new(&config.encryption)?;
        let scheduler = RetryScheduler::new(&config.retry, FailureRegistry::default());
        Ok(Self {
            ctx: Rc::new(LoaderContext::new(Box::new(transport), transform, scheduler)),
            ttl_cache: TtlCache::new(config.ttl_cache.clone()),
            image_cache: BudgetedImageCache::new(config.image_cache.clone()),
            queue: RequestQueue::new(),
            config,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn transform(&self) -> &ByteTransform {
        &self.ctx.transform
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.ctx.scheduler
    }

    pub fn registry(&self) -> &FailureRegistry {
        self.ctx.scheduler.registry()
    }

    pub fn image_cache(&self) -> &BudgetedImageCache<LoadUnit> {
        &self.image_cache
    }

    pub fn ttl_cache(&self) -> &TtlCache<LoadUnit> {
        &self.ttl_cache
    }

    pub fn queue(&self) -> &RequestQueue<LoadUnit> {
        &self.queue
    }

    /// Unit for `url`, fetched and decoded as soon as possible. An empty url is blank and ready.
    pub fn load(&mut self, url: &str) -> LoadUnit {
        if url.is_empty() {
            return LoadUnit::blank(&self.ctx);
        }
        if let Some(unit) = self.image_cache.get(url) {
            let unit = unit.clone();
            if !unit.is_ready() {
                unit.decode();
            }
            return unit;
        }
        let unit = LoadUnit::load(url, &self.ctx);
        self.image_cache.add(url, unit.clone());
        unit
    }

    /// Unit for `url` queued for prefetching, or the cached one moved to the front of the queue
    pub fn request(&mut self, url: &str) -> LoadUnit {
        if url.is_empty() {
            return LoadUnit::blank(&self.ctx);
        }
        if let Some(unit) = self.image_cache.get(url) {
            let unit = unit.clone();
            self.queue.raise_priority(url);
            return unit;
        }
        let unit = LoadUnit::request(url, &self.ctx);
        self.image_cache.add(url, unit.clone());
        self.queue.enqueue(url, unit.clone());
        unit
    }

    /// [`ResourceManager::load`], pinned in the image cache until `reservation_id` is released
    pub fn reserve(&mut self, url: &str, reservation_id: u64) -> LoadUnit {
        let unit = self.load(url);
        if !url.is_empty() {
            self.image_cache.reserve(url, unit.clone(), reservation_id);
        }
        unit
    }

    pub fn release_reservation(&mut self, reservation_id: u64) {
        self.image_cache.release_reservation(reservation_id);
    }

    pub fn raise_priority(&mut self, url: &str) {
        self.queue.raise_priority(url);
    }

    /// Unit for `url` kept in the TTL cache, expiring `ttl_ticks` and/or `ttl_seconds` after its
    /// last touch. Zero disables the axis.
    pub fn load_cached(
        &mut self,
        url: &str,
        ttl_ticks: u64,
        ttl_seconds: f64,
    ) -> (LoadUnit, EntryHandle<LoadUnit>) {
        if let Some(handle) = self.ttl_cache.handle(url) {
            if let Some(unit) = self.ttl_cache.get_item(url).cloned() {
                let _ = self.ttl_cache.touch(&handle);
                if !unit.is_ready() {
                    unit.decode();
                }
                return (unit, handle);
            }
        }
        let unit = LoadUnit::load(url, &self.ctx);
        let handle = self.ttl_cache.set_item(url, unit.clone());
        // the handle was just created
        let _ = self.ttl_cache.set_time_to_live(&handle, ttl_ticks, ttl_seconds);
        (unit, handle)
    }

    /// Keep a TTL cached unit alive, reviving it if it expired since. Returns whether it is
    /// cached afterwards.
    pub fn touch(&mut self, entry: &EntryHandle<LoadUnit>) -> Result<bool, CacheError> {
        self.ttl_cache.touch(entry)
    }

    /// Number of fetches a unit is still waiting on
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight()
    }

    /// Deliver finished transports, returns how many reached a live unit
    pub fn pump_completions(&mut self) -> usize {
        self.ctx.pump()
    }

    /// Per frame step: deliver completions, fire due retries, sweep the TTL cache, evict over
    /// budget images and advance the request queue
    pub fn update(&mut self, ticks: u64, delta_seconds: f64) {
        self.pump_completions();
        // both clocks only move forward, a bogus delta advances neither
        let delta = Duration::try_from_secs_f64(delta_seconds).unwrap_or_default();
        let retried = self.ctx.scheduler.update(delta);
        if retried > 0 {
            tracing::debug!("Fired {} retries", retried);
        }
        self.ttl_cache.tick(ticks, delta.as_secs_f64());
        self.image_cache.truncate();
        self.queue.update();
    }

    /// Whether every image which is meant to be decoded is ready
    pub fn is_ready(&self) -> bool {
        self.image_cache.is_ready()
    }

    /// First image which failed to load
    pub fn error_unit(&self) -> Option<LoadUnit> {
        self.image_cache.error_item().cloned()
    }

    pub fn retry_all(&self) -> usize {
        self.registry().retry_all()
    }

    /// Confirm input from the user. Retries the failed resources if there are any, returns
    /// whether the input was consumed by that.
    pub fn on_confirm(&self) -> bool {
        if self.registry().exists() {
            self.retry_all();
            true
        } else {
            false
        }
    }

    /// Url the loading error overlay should name, if it is up
    pub fn loading_error(&self) -> Option<String> {
        self.registry().loading_error()
    }

    /// Drop every cached unit and queued request. Units still held elsewhere keep working.
    pub fn clear(&mut self) {
        self.image_cache = BudgetedImageCache::new(self.config.image_cache.clone());
        self.ttl_cache.clear();
        self.queue.clear();
    }
}
