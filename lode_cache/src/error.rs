use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CacheError {
    /// The entry behind the handle has been reclaimed, or belongs to another cache
    #[error("Cache entry handle no longer resolves to an entry")]
    StaleEntry,
}
