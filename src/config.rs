/// Configuration surface for the authentication core.
///
/// Everything here is environment-provided; the crate never decides how the
/// values are stored, it only validates them at load time.
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AuthError, Result};

/// Minimum length for a signing secret, in bytes. Anything shorter is
/// rejected at startup rather than discovered in an incident review.
const MIN_SIGNING_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_token_secret: String,
    /// HMAC secret for refresh tokens. Must differ from the access secret.
    pub refresh_token_secret: String,
    /// Base64-encoded 32-byte AES-256-GCM key for secrets at rest.
    pub encryption_key: String,

    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: i64,
    /// Hard ceiling on token age regardless of `exp`, defense in depth
    /// against long-lived stolen tokens.
    #[serde(default = "default_max_token_age_secs")]
    pub max_token_age_secs: i64,

    #[serde(default = "default_lock_threshold")]
    pub lock_threshold: i32,
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: i64,

    #[serde(default = "default_fingerprinting_enabled")]
    pub fingerprinting_enabled: bool,

    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,

    /// TTL for positively-cached verification results.
    #[serde(default = "default_positive_cache_ttl_secs")]
    pub positive_cache_ttl_secs: i64,
    /// Upper bound on any single cache round-trip during verification.
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,

    #[serde(default = "default_password_history_size")]
    pub password_history_size: usize,
}

fn default_access_token_ttl_secs() -> i64 {
    900 // 15 minutes
}

fn default_refresh_token_ttl_secs() -> i64 {
    7 * 24 * 3600
}

fn default_max_token_age_secs() -> i64 {
    24 * 3600
}

fn default_lock_threshold() -> i32 {
    5
}

fn default_lock_duration_secs() -> i64 {
    30 * 60
}

fn default_fingerprinting_enabled() -> bool {
    true
}

fn default_backup_code_count() -> usize {
    10
}

fn default_positive_cache_ttl_secs() -> i64 {
    300
}

fn default_cache_timeout_ms() -> u64 {
    500
}

fn default_password_history_size() -> usize {
    5
}

impl AuthConfig {
    /// Load from environment variables, then validate.
    pub fn from_env() -> Result<Self> {
        let config: AuthConfig =
            envy::from_env().map_err(|e| AuthError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently weaken the system.
    pub fn validate(&self) -> Result<()> {
        if self.access_token_secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(AuthError::Config(format!(
                "access token secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        if self.refresh_token_secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(AuthError::Config(format!(
                "refresh token secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(AuthError::Config(
                "access and refresh token secrets must differ".to_string(),
            ));
        }

        let key = base64_engine
            .decode(&self.encryption_key)
            .map_err(|e| AuthError::Config(format!("encryption key is not valid base64: {e}")))?;
        if key.len() != 32 {
            return Err(AuthError::Config(format!(
                "encryption key must decode to 32 bytes, got {}",
                key.len()
            )));
        }

        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(AuthError::Config(
                "token TTLs must be positive".to_string(),
            ));
        }
        if self.lock_threshold < 1 {
            return Err(AuthError::Config(
                "lock threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn lock_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_duration_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}
