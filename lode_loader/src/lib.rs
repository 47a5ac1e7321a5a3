//! Load pipeline for externally fetched resources.
//!
//! Consumers ask a [`ResourceManager`] for a resource by url and get a [`LoadUnit`] back
//! immediately. The unit moves through its [`LoadState`]s as the [`Transport`] delivers bytes,
//! which are optionally run through a [`ByteTransform`] and decoded into a [`Texture`].
//! Nothing here blocks: the host calls [`ResourceManager::update`] once per frame, which drains
//! transport completions, fires due retries, sweeps the caches and advances the request queue.

mod config;
mod context;
mod error;
mod manager;
mod queue;
mod retry;
mod transform;
pub mod transport;
mod unit;

pub use config::{EncryptionConfig, LoaderConfig, RetryConfig};
pub use error::{LoadError, TransformError, TransportError};
pub use lode_cache::{
    Budgeted, BudgetedImageCache, CacheError, EntryHandle, ImageCacheConfig, TtlCache,
    TtlCacheConfig,
};
pub use manager::ResourceManager;
pub use queue::{Request, RequestQueue, RequestQueueEntry};
pub use retry::{FailureRegistry, RetryAction, RetryScheduler, RetryTrigger};
pub use transform::{encrypted_url, ByteTransform, HEADER_LENGTH};
pub use transport::{
    Completion, CompletionSender, FetchRequest, PendingCompletion, Ticket, Transport,
};
pub use unit::{LoadListener, LoadState, LoadUnit, Texture};
