//! Resource caches driven by the host frame loop.
//!
//! Two independent strategies live here:
//! - [`TtlCache`]: entries expire after a number of ticks and/or seconds since their last touch,
//!   swept lazily once enough time has accumulated.
//! - [`BudgetedImageCache`]: entries are evicted least-recently-used first once the summed cost
//!   exceeds a budget, except for entries which must be held.

mod budget;
mod error;
mod ttl;

pub use budget::{Budgeted, BudgetedImageCache, ImageCacheConfig, ImageCacheItem};
pub use error::CacheError;
pub use ttl::{CacheEntry, EntryHandle, TtlCache, TtlCacheConfig};
