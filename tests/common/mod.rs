/// Helpers shared by the integration suites: deterministic config and a
/// clock the tests move by hand.
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

use auth_core::clock::Clock;
use auth_core::AuthConfig;

pub fn test_config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "integration-access-secret-0123456789-ab".to_string(),
        refresh_token_secret: "integration-refresh-secret-0123456789-a".to_string(),
        encryption_key: base64_engine.encode([0x07u8; 32]),
        access_token_ttl_secs: 900,
        refresh_token_ttl_secs: 7 * 24 * 3600,
        max_token_age_secs: 24 * 3600,
        lock_threshold: 5,
        lock_duration_secs: 30 * 60,
        fingerprinting_enabled: true,
        backup_code_count: 10,
        positive_cache_ttl_secs: 300,
        cache_timeout_ms: 500,
        password_history_size: 5,
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
