//! Repository interface for user accounts.
//!
//! Persistence sits behind this trait; the core never talks to a concrete
//! store directly. The two counter-style operations
//! (`record_login_failure`, `consume_backup_code`) are contractually
//! atomic: implementations must perform them as a single conditional
//! update so concurrent attempts cannot lose writes or double-spend.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::UserAccount;

mod memory;
mod postgres;

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

/// Lockout fields after an atomic failure transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new account. Fails with `EmailAlreadyExists` on a
    /// duplicate email.
    async fn create(&self, account: UserAccount) -> Result<UserAccount>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>>;

    /// Lookup by email; callers pass the address already lowercased.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>>;

    /// Replace the password hash, pushing the old one onto the bounded
    /// history (most recent first).
    async fn update_password(
        &self,
        id: Uuid,
        new_hash: &str,
        history_limit: usize,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomic failed-login transition: increment the counter (restarting
    /// from 1 when a previous lock has expired) and set `locked_until`
    /// once the threshold is reached.
    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockoutState>;

    /// Successful-login transition: counter back to zero, lock cleared.
    async fn reset_login_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Store a (re-)enrollment: encrypted seed plus fresh backup-code
    /// hashes, replacing whatever was there.
    async fn store_mfa_enrollment(
        &self,
        id: Uuid,
        encrypted_seed: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomic compare-and-delete of one backup-code hash. Returns whether
    /// the hash was present (and is now gone); a concurrent duplicate
    /// spend of the same code loses the race and gets `false`.
    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool>;

    /// Soft-deactivate; accounts are never hard-deleted.
    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;
}
