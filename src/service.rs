//! Authentication flows: the orchestration layer over the hasher, lockout
//! tracker, MFA manager, token service and cache.
//!
//! Login order is fixed: lockout gate first (a locked account never
//! reaches the hasher), then the credential check, then the MFA pause,
//! and only then token issuance.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::cache::TokenCache;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::UserRepository;
use crate::error::{AuthError, Result};
use crate::lockout::{LockoutDecision, LockoutTracker};
use crate::models::UserAccount;
use crate::security::mfa::TotpProvider;
use crate::security::password::{matches_recent_password, validate_password_strength};
use crate::security::{EncryptionService, MfaEnrollment, MfaManager, PasswordHasher};
use crate::token::{TokenService, TokenType};

fn session_key(jti: &str) -> String {
    format!("auth:session:{jti}")
}

/// Access/refresh pair handed to the boundary on a completed login.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub access_fingerprint: Option<String>,
    pub refresh_fingerprint: Option<String>,
}

/// Result of a credential check: either a finished session or a pause
/// waiting for the MFA step. No tokens exist until that step passes.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Complete(SessionTokens),
    MfaRequired { account_id: Uuid },
}

impl LoginOutcome {
    pub fn mfa_required(&self) -> bool {
        matches!(self, LoginOutcome::MfaRequired { .. })
    }
}

pub struct AuthService {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn TokenCache>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenService,
    mfa: MfaManager,
    lockout: LockoutTracker,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        cache: Arc<dyn TokenCache>,
        hasher: Arc<dyn PasswordHasher>,
        totp: Arc<dyn TotpProvider>,
        clock: Arc<dyn Clock>,
        config: Arc<AuthConfig>,
    ) -> Result<Self> {
        config.validate()?;
        let encryption = Arc::new(EncryptionService::new(&config.encryption_key)?);
        let tokens = TokenService::new(config.clone(), cache.clone(), clock.clone());
        let mfa = MfaManager::new(
            repo.clone(),
            encryption,
            totp,
            clock.clone(),
            config.backup_code_count,
        );
        let lockout = LockoutTracker::new(repo.clone(), config.clone(), clock.clone());

        Ok(Self {
            repo,
            cache,
            hasher,
            tokens,
            mfa,
            lockout,
            clock,
            config,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn mfa(&self) -> &MfaManager {
        &self.mfa
    }

    /// Create an account. The password is strength-checked and hashed; the
    /// email is normalized to lowercase.
    pub async fn register(&self, email: &str, password: &str) -> Result<UserAccount> {
        validate_password_strength(password)?;
        let hash = self.hasher.hash(password)?;
        let account = self
            .repo
            .create(UserAccount::new(email, "user", hash, self.clock.now()))
            .await?;

        tracing::info!(account_id = %account.id, "user registered");
        Ok(account)
    }

    /// The login flow of the endpoint contract. Unknown email, wrong
    /// password and deactivated account all collapse to
    /// `InvalidCredentials`; lockout is the one state the user is told
    /// about explicitly.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = email.to_lowercase();
        let account = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        // Locked accounts are rejected before the hasher runs: no timing
        // oracle, no wasted work, no counter churn.
        if let LockoutDecision::Locked { until } = self.lockout.check(&account) {
            tracing::warn!(account_id = %account.id, locked_until = %until, "login attempt while locked");
            return Err(AuthError::AccountLocked { until });
        }

        if !self.hasher.verify(password, &account.password_hash)? {
            self.lockout.register_failure(account.id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.register_success(account.id).await?;

        if account.has_mfa_enabled() {
            tracing::info!(account_id = %account.id, "login pending MFA");
            return Ok(LoginOutcome::MfaRequired {
                account_id: account.id,
            });
        }

        let session = self.issue_session(&account).await?;
        tracing::info!(account_id = %account.id, "login complete");
        Ok(LoginOutcome::Complete(session))
    }

    /// Second half of an MFA login. A malformed code surfaces as
    /// `MfaInvalid` before any secret is consulted; a non-matching code is
    /// also `MfaInvalid`, with no hint whether it was wrong or merely
    /// outside the time window.
    pub async fn complete_mfa_login(&self, account_id: Uuid, code: &str) -> Result<SessionTokens> {
        let account = self
            .repo
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !account.is_active {
            return Err(AuthError::InvalidCredentials);
        }
        if let LockoutDecision::Locked { until } = self.lockout.check(&account) {
            return Err(AuthError::AccountLocked { until });
        }

        if !self.mfa.verify(&account, code).await? {
            tracing::warn!(account_id = %account.id, "MFA verification rejected");
            return Err(AuthError::MfaInvalid);
        }

        let session = self.issue_session(&account).await?;
        tracing::info!(account_id = %account.id, "MFA login complete");
        Ok(session)
    }

    /// The MFA verify endpoint contract: `{valid: bool}` for well-formed
    /// codes, `MfaInvalid` for malformed input.
    pub async fn verify_mfa_code(&self, account_id: Uuid, code: &str) -> Result<bool> {
        let account = self
            .repo
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.mfa.verify(&account, code).await
    }

    pub async fn enroll_mfa(&self, account_id: Uuid) -> Result<MfaEnrollment> {
        self.mfa.enroll(account_id).await
    }

    /// Rotate the refresh token and mint a fresh access token.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        fingerprint: Option<&str>,
    ) -> Result<SessionTokens> {
        let claims = self
            .tokens
            .verify_token(refresh_token, TokenType::Refresh, fingerprint)
            .await?;

        let new_refresh = self
            .tokens
            .rotate_refresh_token(refresh_token, fingerprint)
            .await?;
        let access = self
            .tokens
            .issue_access_token(&claims.sub, &claims.email, &claims.role)?;

        self.record_session(&new_refresh.token_id, new_refresh.fingerprint.as_deref())
            .await;

        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: new_refresh.token,
            expires_in: access.expires_in,
            access_fingerprint: access.fingerprint,
            refresh_fingerprint: new_refresh.fingerprint,
        })
    }

    /// Revoke the presented refresh token and drop its session record.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let claims = self
            .tokens
            .verify_token(refresh_token, TokenType::Refresh, None)
            .await?;
        self.tokens
            .revoke_token(refresh_token, TokenType::Refresh)
            .await?;

        let _ = timeout(
            self.config.cache_timeout(),
            self.cache.delete(&session_key(&claims.jti)),
        )
        .await;

        tracing::info!(sub = %claims.sub, "logged out");
        Ok(())
    }

    /// Revoke every outstanding token for the account.
    pub async fn logout_all(&self, account_id: Uuid) -> Result<()> {
        self.tokens.revoke_all_for_user(account_id).await
    }

    /// Change the password: verify the old one, refuse reuse of anything
    /// in the bounded history, then invalidate every outstanding token.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let account = self
            .repo
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.hasher.verify(old_password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        validate_password_strength(new_password)?;
        if matches_recent_password(
            self.hasher.as_ref(),
            new_password,
            &account.password_hash,
            &account.previous_password_hashes,
        )? {
            return Err(AuthError::PasswordReuse);
        }

        let new_hash = self.hasher.hash(new_password)?;
        self.repo
            .update_password(
                account_id,
                &new_hash,
                self.config.password_history_size,
                self.clock.now(),
            )
            .await?;

        self.tokens.revoke_all_for_user(account_id).await?;
        tracing::info!(account_id = %account_id, "password changed, sessions revoked");
        Ok(())
    }

    pub async fn deactivate(&self, account_id: Uuid) -> Result<()> {
        self.repo.deactivate(account_id, self.clock.now()).await?;
        self.tokens.revoke_all_for_user(account_id).await?;
        tracing::warn!(account_id = %account_id, "account deactivated");
        Ok(())
    }

    async fn issue_session(&self, account: &UserAccount) -> Result<SessionTokens> {
        let sub = account.id.to_string();
        let access = self
            .tokens
            .issue_access_token(&sub, &account.email, &account.role)?;
        let refresh = self
            .tokens
            .issue_refresh_token(&sub, &account.email, &account.role)?;

        self.record_session(&refresh.token_id, refresh.fingerprint.as_deref())
            .await;

        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: access.expires_in,
            access_fingerprint: access.fingerprint,
            refresh_fingerprint: refresh.fingerprint,
        })
    }

    /// Record the refresh jti → fingerprint binding. Best effort: a lost
    /// record only means the session is invisible to introspection, and an
    /// abandoned issuance simply expires with its entry.
    async fn record_session(&self, jti: &str, fingerprint: Option<&str>) {
        let ttl = Duration::from_secs(self.config.refresh_token_ttl_secs as u64);
        let result = timeout(
            self.config.cache_timeout(),
            self.cache
                .set(&session_key(jti), fingerprint.unwrap_or(""), ttl),
        )
        .await;

        if !matches!(result, Ok(Ok(()))) {
            tracing::warn!(jti = %jti, "session record write failed");
        }
    }
}
