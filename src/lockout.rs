//! Account lockout: a per-account failure counter with a lock timer.
//!
//! The decision is derived, never stored: given the account's counter
//! fields and the current time, an attempt is either allowed or rejected.
//! The transitions themselves run as atomic read-modify-writes inside the
//! repository, so concurrent failures for one account cannot lose counts.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::{LockoutState, UserRepository};
use crate::error::Result;
use crate::models::UserAccount;

/// Outcome of the pre-credential gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutDecision {
    Allowed,
    Locked { until: DateTime<Utc> },
}

impl LockoutDecision {
    /// Pure derivation from account state and the current time. An
    /// expired lock window counts as Allowed (auto-unlock).
    pub fn derive(account: &UserAccount, now: DateTime<Utc>) -> Self {
        match account.locked_until {
            Some(until) if now < until => LockoutDecision::Locked { until },
            _ => LockoutDecision::Allowed,
        }
    }
}

pub struct LockoutTracker {
    repo: Arc<dyn UserRepository>,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
}

impl LockoutTracker {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        config: Arc<AuthConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            config,
            clock,
        }
    }

    pub fn check(&self, account: &UserAccount) -> LockoutDecision {
        LockoutDecision::derive(account, self.clock.now())
    }

    /// Record a failed credential check. Returns the post-transition
    /// state; the account may now be locked.
    pub async fn register_failure(&self, account_id: Uuid) -> Result<LockoutState> {
        let state = self
            .repo
            .record_login_failure(
                account_id,
                self.config.lock_threshold,
                self.config.lock_duration(),
                self.clock.now(),
            )
            .await?;

        if let Some(until) = state.locked_until {
            tracing::warn!(
                account_id = %account_id,
                failed_attempts = state.failed_login_count,
                locked_until = %until,
                "account locked after repeated failures"
            );
        }

        Ok(state)
    }

    /// Record a successful credential check: counter back to zero.
    pub async fn register_success(&self, account_id: Uuid) -> Result<()> {
        self.repo
            .reset_login_failures(account_id, self.clock.now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account() -> UserAccount {
        UserAccount::new("a@b.com", "user", "hash".into(), Utc::now())
    }

    #[test]
    fn test_derive_allowed_when_unlocked() {
        let account = account();
        assert_eq!(
            LockoutDecision::derive(&account, Utc::now()),
            LockoutDecision::Allowed
        );
    }

    #[test]
    fn test_derive_locked_inside_window() {
        let now = Utc::now();
        let until = now + Duration::minutes(30);
        let mut account = account();
        account.failed_login_count = 5;
        account.locked_until = Some(until);

        assert_eq!(
            LockoutDecision::derive(&account, now),
            LockoutDecision::Locked { until }
        );
    }

    #[test]
    fn test_derive_auto_unlock_after_window() {
        let now = Utc::now();
        let mut account = account();
        account.failed_login_count = 5;
        account.locked_until = Some(now - Duration::seconds(1));

        assert_eq!(
            LockoutDecision::derive(&account, now),
            LockoutDecision::Allowed
        );
    }
}
