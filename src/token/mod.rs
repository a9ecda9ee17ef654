//! Signed-token issuance, verification and rotation.
//!
//! Tokens are JWTs signed with HMAC-SHA256; access and refresh tokens use
//! distinct secrets, carry a unique jti for revocation tracking and,
//! optionally, a random fingerprint bound at issuance. Freshness is
//! validated against the injected clock so expiry is testable and the
//! `TokenExpired` / `TokenTooOld` distinction survives.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::cache::TokenCache;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

mod claims;
mod revocation;

pub use claims::{IssuedToken, TokenClaims, TokenType};
pub use revocation::RevocationList;

/// Tokens stamped further in the future than this are rejected outright.
const MAX_IAT_FUTURE_SKEW_SECS: i64 = 300;

/// Floor for revocation-marker TTLs, so a marker for a nearly-expired
/// token still outlives any clock disagreement.
const MIN_REVOCATION_TTL_SECS: i64 = 300;

fn verified_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("auth:verified:{:x}", hasher.finalize())
}

pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    config: Arc<AuthConfig>,
    cache: Arc<dyn TokenCache>,
    revocation: RevocationList,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        config: Arc<AuthConfig>,
        cache: Arc<dyn TokenCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let revocation = RevocationList::new(cache.clone(), config.cache_timeout());
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            config,
            cache,
            revocation,
            clock,
        }
    }

    pub fn revocation(&self) -> &RevocationList {
        &self.revocation
    }

    pub fn issue_access_token(&self, sub: &str, email: &str, role: &str) -> Result<IssuedToken> {
        self.issue(TokenType::Access, sub, email, role)
    }

    pub fn issue_refresh_token(&self, sub: &str, email: &str, role: &str) -> Result<IssuedToken> {
        self.issue(TokenType::Refresh, sub, email, role)
    }

    fn issue(&self, token_type: TokenType, sub: &str, email: &str, role: &str) -> Result<IssuedToken> {
        let now = self.clock.now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.config.access_token_ttl_secs,
            TokenType::Refresh => self.config.refresh_token_ttl_secs,
        };
        let jti = Uuid::new_v4().to_string();
        let fingerprint = self
            .config
            .fingerprinting_enabled
            .then(generate_fingerprint);

        let claims = TokenClaims {
            sub: sub.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            token_type,
            jti: jti.clone(),
            fingerprint: fingerprint.clone(),
            iat: now,
            exp: now + ttl,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            self.encoding_key(token_type),
        )
        .map_err(|e| AuthError::Hashing(format!("token signing failed: {e}")))?;

        tracing::info!(jti = %jti, token_type = %token_type, "token issued");

        Ok(IssuedToken {
            token,
            token_id: jti,
            fingerprint,
            expires_in: ttl,
        })
    }

    /// Verify a token, in order: structure, signature against the secret
    /// for `expected`, type, fingerprint, freshness, revocation. A
    /// positive-cache hit skips the signature work; everything from the
    /// type check onward is applied unconditionally.
    pub async fn verify_token(
        &self,
        token: &str,
        expected: TokenType,
        fingerprint: Option<&str>,
    ) -> Result<TokenClaims> {
        if token.split('.').count() != 3 {
            return Err(AuthError::MalformedToken);
        }

        let cache_key = verified_key(token);
        if let Some(cached) = self.positive_cache_get(&cache_key).await {
            if let Ok(claims) = serde_json::from_str::<TokenClaims>(&cached) {
                self.check_claims(&claims, expected, fingerprint)?;
                self.check_revocation(&claims).await?;
                return Ok(claims);
            }
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false; // freshness is checked against our clock below
        validation.required_spec_claims.clear();

        let data = decode::<TokenClaims>(token, self.decoding_key(expected), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => AuthError::SignatureInvalid,
                _ => AuthError::MalformedToken,
            })?;
        let claims = data.claims;

        self.check_claims(&claims, expected, fingerprint)?;
        self.check_revocation(&claims).await?;

        self.positive_cache_store(&cache_key, &claims).await;

        Ok(claims)
    }

    /// Rotation: verify the old refresh token, revoke its jti, then issue
    /// the replacement. A failed revocation write fails the rotation, so
    /// there is no state in which both tokens survive a restart.
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
        fingerprint: Option<&str>,
    ) -> Result<IssuedToken> {
        let old_claims = self
            .verify_token(old_token, TokenType::Refresh, fingerprint)
            .await?;

        let remaining = (old_claims.exp - self.clock.now().timestamp())
            .max(MIN_REVOCATION_TTL_SECS);
        self.revocation
            .revoke_jti(&old_claims.jti, Duration::from_secs(remaining as u64))
            .await?;

        // Stale positive-cache entry for the old token is harmless (the
        // revocation check still rejects it) but drop it when we can.
        let _ = timeout(
            self.config.cache_timeout(),
            self.cache.delete(&verified_key(old_token)),
        )
        .await;

        tracing::info!(
            old_jti = %old_claims.jti,
            sub = %old_claims.sub,
            "refresh token rotated"
        );

        self.issue(
            TokenType::Refresh,
            &old_claims.sub,
            &old_claims.email,
            &old_claims.role,
        )
    }

    /// Revoke a single presented token (logout).
    pub async fn revoke_token(&self, token: &str, expected: TokenType) -> Result<()> {
        let claims = self.verify_token(token, expected, None).await?;
        let remaining = (claims.exp - self.clock.now().timestamp()).max(MIN_REVOCATION_TTL_SECS);
        self.revocation
            .revoke_jti(&claims.jti, Duration::from_secs(remaining as u64))
            .await
    }

    /// Revoke every outstanding token for an account.
    pub async fn revoke_all_for_user(&self, account_id: Uuid) -> Result<()> {
        self.revocation
            .revoke_all_for_user(
                account_id,
                self.clock.now(),
                Duration::from_secs(self.config.refresh_token_ttl_secs as u64),
            )
            .await
    }

    fn encoding_key(&self, token_type: TokenType) -> &EncodingKey {
        match token_type {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        }
    }

    fn decoding_key(&self, token_type: TokenType) -> &DecodingKey {
        match token_type {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        }
    }

    /// Steps 3-5: type, fingerprint, freshness.
    fn check_claims(
        &self,
        claims: &TokenClaims,
        expected: TokenType,
        fingerprint: Option<&str>,
    ) -> Result<()> {
        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType {
                expected: expected.to_string(),
                actual: claims.token_type.to_string(),
            });
        }

        if self.config.fingerprinting_enabled {
            if let Some(presented) = fingerprint {
                if claims.fingerprint.as_deref() != Some(presented) {
                    return Err(AuthError::FingerprintMismatch);
                }
            }
        }

        let now = self.clock.now().timestamp();
        if now >= claims.exp {
            return Err(AuthError::TokenExpired);
        }
        if claims.iat > now + MAX_IAT_FUTURE_SKEW_SECS {
            return Err(AuthError::MalformedToken);
        }
        if now - claims.iat > self.config.max_token_age_secs {
            return Err(AuthError::TokenTooOld);
        }

        Ok(())
    }

    /// Step 6: per-jti marker, then the user-wide revocation timestamp.
    async fn check_revocation(&self, claims: &TokenClaims) -> Result<()> {
        if self.revocation.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }
        if let Some(revoked_at) = self.revocation.user_revoked_at(&claims.sub).await? {
            if claims.iat < revoked_at {
                return Err(AuthError::TokenRevoked);
            }
        }
        Ok(())
    }

    /// Positive-cache read, degraded to a miss on timeout or backend
    /// failure so verification falls through to the signature path.
    async fn positive_cache_get(&self, key: &str) -> Option<String> {
        match timeout(self.config.cache_timeout(), self.cache.get(key)).await {
            Ok(Ok(entry)) => entry,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "positive cache read failed, re-verifying");
                None
            }
            Err(_) => {
                tracing::warn!("positive cache read timed out, re-verifying");
                None
            }
        }
    }

    /// Best-effort write; a lost entry only costs a future re-verification.
    async fn positive_cache_store(&self, key: &str, claims: &TokenClaims) {
        let remaining = claims.exp - self.clock.now().timestamp();
        if remaining <= 0 {
            return;
        }
        let ttl = Duration::from_secs(
            remaining.min(self.config.positive_cache_ttl_secs).max(1) as u64,
        );

        let Ok(json) = serde_json::to_string(claims) else {
            return;
        };
        if timeout(self.config.cache_timeout(), self.cache.set(key, &json, ttl))
            .await
            .is_err()
        {
            tracing::warn!("positive cache write timed out");
        }
    }
}

fn generate_fingerprint() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
