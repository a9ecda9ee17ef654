use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure taxonomy for the authentication core.
///
/// Every kind is returned to the caller as-is; the HTTP boundary decides
/// how much of it end users get to see, but audit logs always carry the
/// specific variant.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token exceeds maximum age")]
    TokenTooOld,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Wrong token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },

    #[error("Token fingerprint mismatch")]
    FingerprintMismatch,

    #[error("Multi-factor verification required")]
    MfaRequired,

    #[error("Invalid multi-factor code")]
    MfaInvalid,

    #[error("Multi-factor authentication is not enrolled")]
    MfaNotEnrolled,

    #[error("Password does not meet strength requirements")]
    WeakPassword,

    #[error("Password was used recently")]
    PasswordReuse,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Failures that indicate misconfiguration or infrastructure trouble
    /// rather than anything the end user did. The boundary maps these to a
    /// 500-equivalent instead of an authentication failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuthError::Hashing(_)
                | AuthError::Encryption(_)
                | AuthError::DecryptionFailed
                | AuthError::Repository(_)
                | AuthError::Config(_)
        )
    }

    /// Short stable identifier for audit logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::UserNotFound => "user_not_found",
            AuthError::EmailAlreadyExists => "email_already_exists",
            AuthError::MalformedToken => "malformed_token",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenTooOld => "token_too_old",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::WrongTokenType { .. } => "wrong_token_type",
            AuthError::FingerprintMismatch => "fingerprint_mismatch",
            AuthError::MfaRequired => "mfa_required",
            AuthError::MfaInvalid => "mfa_invalid",
            AuthError::MfaNotEnrolled => "mfa_not_enrolled",
            AuthError::WeakPassword => "weak_password",
            AuthError::PasswordReuse => "password_reuse",
            AuthError::Hashing(_) => "hashing_error",
            AuthError::Encryption(_) => "encryption_error",
            AuthError::DecryptionFailed => "decryption_failed",
            AuthError::Repository(_) => "repository_error",
            AuthError::Cache(_) => "cache_error",
            AuthError::Config(_) => "config_error",
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Repository(err.to_string())
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::Cache(err.to_string())
    }
}
