use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{LockoutState, UserRepository};
use crate::error::{AuthError, Result};
use crate::models::UserAccount;

/// Mutex-guarded map store. Every mutating method runs its whole transition
/// inside a single lock hold, which is what gives the counter operations
/// their atomicity here.
#[derive(Default)]
pub struct InMemoryUserRepository {
    accounts: Mutex<HashMap<Uuid, UserAccount>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: read an account without going through a flow.
    pub async fn snapshot(&self, id: Uuid) -> Option<UserAccount> {
        self.accounts.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, account: UserAccount) -> Result<UserAccount> {
        let mut accounts = self.accounts.lock().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(AuthError::EmailAlreadyExists);
        }
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn update_password(
        &self,
        id: Uuid,
        new_hash: &str,
        history_limit: usize,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;

        let old = std::mem::replace(&mut account.password_hash, new_hash.to_string());
        account.previous_password_hashes.insert(0, old);
        account.previous_password_hashes.truncate(history_limit);
        account.updated_at = now;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockoutState> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;

        // A lock that has expired restarts the cycle instead of stacking
        // onto the old counter.
        let expired_lock = matches!(account.locked_until, Some(until) if until <= now);
        account.failed_login_count = if expired_lock {
            1
        } else {
            account.failed_login_count + 1
        };
        account.locked_until = if account.failed_login_count >= threshold {
            Some(now + lock_duration)
        } else {
            None
        };
        account.updated_at = now;

        Ok(LockoutState {
            failed_login_count: account.failed_login_count,
            locked_until: account.locked_until,
        })
    }

    async fn reset_login_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        account.failed_login_count = 0;
        account.locked_until = None;
        account.updated_at = now;
        Ok(())
    }

    async fn store_mfa_enrollment(
        &self,
        id: Uuid,
        encrypted_seed: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        account.mfa_enabled = true;
        account.mfa_seed = Some(encrypted_seed.to_string());
        account.backup_code_hashes = backup_code_hashes.to_vec();
        account.updated_at = now;
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;

        match account
            .backup_code_hashes
            .iter()
            .position(|h| h == code_hash)
        {
            Some(index) => {
                account.backup_code_hashes.remove(index);
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        account.is_active = false;
        account.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn account() -> UserAccount {
        UserAccount::new("a@b.com", "user", "hash".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(account()).await.unwrap();
        assert!(matches!(
            repo.create(account()).await,
            Err(AuthError::EmailAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_failure_transition_locks_at_threshold() {
        let repo = InMemoryUserRepository::new();
        let id = repo.create(account()).await.unwrap().id;
        let now = Utc::now();

        for n in 1..5 {
            let state = repo
                .record_login_failure(id, 5, Duration::minutes(30), now)
                .await
                .unwrap();
            assert_eq!(state.failed_login_count, n);
            assert!(state.locked_until.is_none());
        }

        let state = repo
            .record_login_failure(id, 5, Duration::minutes(30), now)
            .await
            .unwrap();
        assert_eq!(state.failed_login_count, 5);
        assert_eq!(state.locked_until, Some(now + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_failure_after_expired_lock_restarts_cycle() {
        let repo = InMemoryUserRepository::new();
        let id = repo.create(account()).await.unwrap().id;
        let locked_at = Utc::now();

        for _ in 0..5 {
            repo.record_login_failure(id, 5, Duration::minutes(30), locked_at)
                .await
                .unwrap();
        }

        let later = locked_at + Duration::minutes(31);
        let state = repo
            .record_login_failure(id, 5, Duration::minutes(30), later)
            .await
            .unwrap();
        assert_eq!(state.failed_login_count, 1);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_consume_backup_code_is_single_use() {
        let repo = InMemoryUserRepository::new();
        let id = repo.create(account()).await.unwrap().id;
        repo.store_mfa_enrollment(id, "seed", &["h1".into(), "h2".into()], Utc::now())
            .await
            .unwrap();

        assert!(repo.consume_backup_code(id, "h1").await.unwrap());
        assert!(!repo.consume_backup_code(id, "h1").await.unwrap());
        assert!(repo.consume_backup_code(id, "h2").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_consume_only_one_wins() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let id = repo.create(account()).await.unwrap().id;
        repo.store_mfa_enrollment(id, "seed", &["h1".into()], Utc::now())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.consume_backup_code(id, "h1").await.unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_password_history_is_bounded() {
        let repo = InMemoryUserRepository::new();
        let id = repo.create(account()).await.unwrap().id;

        for n in 0..4 {
            repo.update_password(id, &format!("hash{n}"), 3, Utc::now())
                .await
                .unwrap();
        }

        let account = repo.snapshot(id).await.unwrap();
        assert_eq!(account.password_hash, "hash3");
        // Most recent first, capped at 3.
        assert_eq!(
            account.previous_password_hashes,
            vec!["hash2".to_string(), "hash1".to_string(), "hash0".to_string()]
        );
    }
}
