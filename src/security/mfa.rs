/// Multi-factor enrollment and verification: TOTP plus single-use backup
/// codes.
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use totp_lite::{totp_custom, Sha1};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::db::UserRepository;
use crate::error::{AuthError, Result};
use crate::models::UserAccount;
use crate::security::EncryptionService;

const SEED_LEN: usize = 20;
const TOTP_STEP_SECS: u64 = 30;
const TOTP_DIGITS: u32 = 6;
const BACKUP_CODE_LEN: usize = 8;
const OTPAUTH_ISSUER: &str = "TaskHub";

/// Time-based step function, pluggable so tests can pin the algorithm.
pub trait TotpProvider: Send + Sync {
    /// The code for `seed` at `unix_time` seconds.
    fn code(&self, seed: &[u8], unix_time: u64) -> String;
}

/// SHA-1/30s/6-digit TOTP, the profile authenticator apps expect.
#[derive(Default)]
pub struct TotpLiteProvider;

impl TotpProvider for TotpLiteProvider {
    fn code(&self, seed: &[u8], unix_time: u64) -> String {
        totp_custom::<Sha1>(TOTP_STEP_SECS, TOTP_DIGITS, seed, unix_time)
    }
}

/// Returned exactly once, at enrollment. The seed and codes are not
/// recoverable afterwards; only the encrypted seed and the code hashes
/// are stored.
pub struct MfaEnrollment {
    /// Base64 seed for manual entry into an authenticator app.
    pub secret: String,
    /// Provisioning URI for QR-code display.
    pub otpauth_uri: String,
    /// Plaintext backup codes.
    pub backup_codes: Vec<String>,
}

pub struct MfaManager {
    repo: Arc<dyn UserRepository>,
    encryption: Arc<EncryptionService>,
    totp: Arc<dyn TotpProvider>,
    clock: Arc<dyn Clock>,
    backup_code_count: usize,
}

impl MfaManager {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        encryption: Arc<EncryptionService>,
        totp: Arc<dyn TotpProvider>,
        clock: Arc<dyn Clock>,
        backup_code_count: usize,
    ) -> Self {
        Self {
            repo,
            encryption,
            totp,
            clock,
            backup_code_count,
        }
    }

    /// Enroll (or re-enroll) an account: fresh seed, fresh backup codes.
    /// The seed is stored AEAD-encrypted and the codes as SHA-256 hashes;
    /// the plaintext forms in the return value are gone after this call.
    pub async fn enroll(&self, account_id: uuid::Uuid) -> Result<MfaEnrollment> {
        let account = self
            .repo
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::thread_rng().fill(&mut seed[..]);

        let encrypted_seed = self.encryption.encrypt_to_string(&seed[..])?;
        let secret = base64_engine.encode(&seed[..]);

        let backup_codes = generate_backup_codes(self.backup_code_count);
        let code_hashes: Vec<String> = backup_codes.iter().map(|c| sha256_hex(c)).collect();

        self.repo
            .store_mfa_enrollment(account_id, &encrypted_seed, &code_hashes, self.clock.now())
            .await?;

        tracing::info!(account_id = %account_id, "MFA enrolled");

        let otpauth_uri = format!(
            "otpauth://totp/{OTPAUTH_ISSUER}:{}?secret={}&issuer={OTPAUTH_ISSUER}",
            urlencoding::encode(&account.email),
            secret
        );

        Ok(MfaEnrollment {
            secret,
            otpauth_uri,
            backup_codes,
        })
    }

    /// Verify a code: TOTP first (one step of clock-skew tolerance either
    /// way), then the backup-code fallback. Returns `Ok(false)` when the
    /// code simply does not match anything; `MfaInvalid` is reserved for
    /// malformed input.
    pub async fn verify(&self, account: &UserAccount, code: &str) -> Result<bool> {
        let seed = match &account.mfa_seed {
            Some(seed) if account.mfa_enabled => seed,
            _ => return Err(AuthError::MfaNotEnrolled),
        };

        if !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::MfaInvalid);
        }

        match code.len() {
            l if l == TOTP_DIGITS as usize => self.verify_totp(seed, code),
            BACKUP_CODE_LEN => self.verify_backup_code(account, code).await,
            _ => Err(AuthError::MfaInvalid),
        }
    }

    fn verify_totp(&self, encrypted_seed: &str, code: &str) -> Result<bool> {
        let seed = self.encryption.decrypt_from_string(encrypted_seed)?;
        let now = self.clock.now().timestamp() as u64;

        // Current window plus one step either side for clock drift.
        for window in [now.saturating_sub(TOTP_STEP_SECS), now, now + TOTP_STEP_SECS] {
            if self.totp.code(&seed, window) == code {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn verify_backup_code(&self, account: &UserAccount, code: &str) -> Result<bool> {
        let consumed = self
            .repo
            .consume_backup_code(account.id, &sha256_hex(code))
            .await?;
        if consumed {
            tracing::warn!(account_id = %account.id, "backup code consumed");
        }
        Ok(consumed)
    }
}

/// Numeric backup codes, `BACKUP_CODE_LEN` digits each.
fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            (0..BACKUP_CODE_LEN)
                .map(|_| {
                    let digit = rng.gen_range(0..10u8);
                    (b'0' + digit) as char
                })
                .collect()
        })
        .collect()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
