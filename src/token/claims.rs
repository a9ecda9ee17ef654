use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed token-type discriminant. Deserialization of any other string
/// fails, so a forged or mistyped `token_type` never reaches the
/// verification logic as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed claims. Ephemeral: they live in tokens and the positive cache,
/// never in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the account id.
    pub sub: String,
    pub email: String,
    pub role: String,
    pub token_type: TokenType,
    /// Unique per issuance; the key for revocation tracking.
    pub jti: String,
    /// Random binding to the issuing context, when fingerprinting is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// What issuance hands back: the signed token plus the metadata the
/// caller needs to store or forward.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub fingerprint: Option<String>,
    /// Seconds until expiry.
    pub expires_in: i64,
}
