//! Negative list for revoked tokens.
//!
//! Entries are keyed by jti and live at least as long as the token they
//! shadow, so a revoked token can never outlive its marker. A user-wide
//! timestamp entry covers "revoke everything" events (password change,
//! global logout) without enumerating tokens.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::cache::TokenCache;
use crate::error::{AuthError, Result};

fn jti_key(jti: &str) -> String {
    format!("auth:revoked:{jti}")
}

fn user_key(sub: &str) -> String {
    format!("auth:revoked:user:{sub}:ts")
}

pub struct RevocationList {
    cache: Arc<dyn TokenCache>,
    cache_timeout: Duration,
}

impl RevocationList {
    pub fn new(cache: Arc<dyn TokenCache>, cache_timeout: Duration) -> Self {
        Self {
            cache,
            cache_timeout,
        }
    }

    /// Register a jti. Errors propagate: callers in the rotation path must
    /// fail the whole operation if this write is lost.
    pub async fn revoke_jti(&self, jti: &str, ttl: Duration) -> Result<()> {
        self.bounded(self.cache.set(&jti_key(jti), "1", ttl)).await?;
        tracing::info!(jti = %jti, ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }

    /// Membership check. Unreachable store is an error, not "not revoked".
    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let entry = self.bounded(self.cache.get(&jti_key(jti))).await?;
        Ok(entry.is_some())
    }

    /// Revoke every token issued to the account before `now`.
    pub async fn revoke_all_for_user(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        self.bounded(self.cache.set(
            &user_key(&account_id.to_string()),
            &now.timestamp().to_string(),
            ttl,
        ))
        .await?;
        tracing::warn!(account_id = %account_id, "all tokens revoked for account");
        Ok(())
    }

    /// The user-wide revocation timestamp, if one is active.
    pub async fn user_revoked_at(&self, sub: &str) -> Result<Option<i64>> {
        let entry = self.bounded(self.cache.get(&user_key(sub))).await?;
        match entry {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AuthError::Cache("invalid revocation timestamp".to_string())),
            None => Ok(None),
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        timeout(self.cache_timeout, fut)
            .await
            .map_err(|_| AuthError::Cache("revocation store call timed out".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryTokenCache;

    fn list() -> RevocationList {
        RevocationList::new(Arc::new(InMemoryTokenCache::new()), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_revoked_jti_is_found() {
        let list = list();
        assert!(!list.is_revoked("jti-1").await.unwrap());

        list.revoke_jti("jti-1", Duration::from_secs(60)).await.unwrap();
        assert!(list.is_revoked("jti-1").await.unwrap());
        assert!(!list.is_revoked("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_wide_revocation_timestamp() {
        let list = list();
        let account_id = Uuid::new_v4();
        let sub = account_id.to_string();
        assert_eq!(list.user_revoked_at(&sub).await.unwrap(), None);

        let now = Utc::now();
        list.revoke_all_for_user(account_id, now, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            list.user_revoked_at(&sub).await.unwrap(),
            Some(now.timestamp())
        );
    }
}
