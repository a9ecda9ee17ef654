use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::cache::TokenCache;
use crate::error::{AuthError, Result};

/// Redis-backed cache for multi-node deployments. The connection manager
/// reconnects on its own; clones are cheap handles to the same connection.
pub struct RedisTokenCache {
    redis: ConnectionManager,
}

impl RedisTokenCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // Redis rejects a zero expiry; clamp to the smallest it accepts.
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AuthError::Cache(e.to_string()))?;
        Ok(())
    }
}
