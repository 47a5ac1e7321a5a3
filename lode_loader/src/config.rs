use lode_cache::{ImageCacheConfig, TtlCacheConfig};
use std::time::Duration;

/// Backoff applied to failed transports before giving up
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before each retry, the number of entries is the number of retries
    pub intervals: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            intervals: vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(3000),
            ],
        }
    }
}

impl RetryConfig {
    pub fn with_intervals(mut self, intervals: Vec<Duration>) -> Self {
        self.intervals = intervals;
        self
    }
}

/// Describes how encrypted resources are recognized and decrypted
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Whether images of this install are shipped encrypted
    pub encrypted_images: bool,
    /// Paths which are always shipped in plain form
    pub ignore_list: Vec<String>,
    /// Hex encoded header parts, 32 hex digits together
    pub signature: String,
    pub version: String,
    pub remain: String,
    /// Hex digit string, one digit per XORed byte
    pub key: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            encrypted_images: false,
            ignore_list: vec!["img/system/Window.png".to_string()],
            signature: "5250474d56000000".to_string(),
            version: "000301".to_string(),
            remain: "0000000000".to_string(),
            key: "6bdb2e585882fbd48826ef9cffd4c511".to_string(),
        }
    }
}

impl EncryptionConfig {
    pub fn with_encrypted_images(mut self, encrypted_images: bool) -> Self {
        self.encrypted_images = encrypted_images;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_ignore_list(mut self, ignore_list: Vec<String>) -> Self {
        self.ignore_list = ignore_list;
        self
    }
}

/// Everything a [`crate::ResourceManager`] is configured with
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    pub ttl_cache: TtlCacheConfig,
    pub image_cache: ImageCacheConfig,
    pub retry: RetryConfig,
    pub encryption: EncryptionConfig,
}

impl LoaderConfig {
    pub fn with_ttl_cache(mut self, ttl_cache: TtlCacheConfig) -> Self {
        self.ttl_cache = ttl_cache;
        self
    }

    pub fn with_image_cache(mut self, image_cache: ImageCacheConfig) -> Self {
        self.image_cache = image_cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = encryption;
        self
    }
}
