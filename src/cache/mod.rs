//! Keyed store with expiry, injected into the token service and auth flows.
//!
//! The same interface backs the positive verification cache and the
//! revocation (negative) list; entries expire on their own, callers never
//! garbage-collect.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

mod memory;
mod redis;

pub use memory::InMemoryTokenCache;
pub use self::redis::RedisTokenCache;

#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Fetch a live entry, `None` on miss or natural expiry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
