/// User account model with authentication security state.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    /// Stored lowercase; lookups normalize before hitting the repository.
    pub email: String,
    pub role: String,
    pub password_hash: String,
    pub is_active: bool,
    pub mfa_enabled: bool,
    /// AEAD-encrypted TOTP seed, base64. Present iff `mfa_enabled`.
    pub mfa_seed: Option<String>,
    /// SHA-256 hex digests, each consumable exactly once.
    pub backup_code_hashes: Vec<String>,
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Bounded history, most recent first.
    pub previous_password_hashes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Build a freshly-registered account. Timestamps are stamped here, not
    /// by the repository.
    pub fn new(email: &str, role: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            role: role.to_string(),
            password_hash,
            is_active: true,
            mfa_enabled: false,
            mfa_seed: None,
            backup_code_hashes: Vec::new(),
            failed_login_count: 0,
            locked_until: None,
            previous_password_hashes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the lock window is still open at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) => now < until,
            None => false,
        }
    }

    pub fn has_mfa_enabled(&self) -> bool {
        self.mfa_enabled && self.mfa_seed.is_some()
    }
}
