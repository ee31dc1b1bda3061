use chrono::{TimeDelta, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// Every token is signed and verified with this algorithm only.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Upper bound on `TOKEN_TTL_HOURS`: one year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

/// Role
///
/// The two-level capability model. Serialized lowercase both in token claims
/// and in API payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    /// Full create/update/delete rights over posts.
    Editor,
    /// Read-only access.
    Reader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Editor => f.write_str("editor"),
            Role::Reader => f.write_str("reader"),
        }
    }
}

/// Claims
///
/// The payload signed into every session token. Tokens are never mutated after
/// issuance and cannot be revoked before `exp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated principal's name.
    pub username: String,
    pub role: Role,
    /// Issued At, seconds since the epoch.
    pub iat: i64,
    /// Expiration Time, seconds since the epoch. Always greater than `iat`.
    pub exp: i64,
}

/// TokenError
///
/// Issue/verify failures. `Expired` is kept apart from the other variants so
/// callers can tell "session expired" from "bad credentials".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("unexpected signing algorithm")]
    AlgorithmMismatch,
    #[error("malformed token")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Encoding(String),
}

/// TokenService
///
/// Issues and verifies HMAC-signed session tokens. The signing key lives here
/// rather than in process-wide state, so tests can run isolated instances with
/// different secrets side by side.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: TimeDelta,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are deliberately omitted.
        f.debug_struct("TokenService").field("ttl", &self.ttl).finish()
    }
}

impl TokenService {
    /// Builds a service around `secret`. A blank secret is a configuration error.
    pub fn new(secret: &str, ttl_hours: i64) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingSigningSecret);
        }
        let ttl = TimeDelta::try_hours(ttl_hours)
            .filter(|_| (1..=MAX_TOKEN_TTL_HOURS).contains(&ttl_hours))
            .ok_or(ConfigError::Invalid {
                var: "TOKEN_TTL_HOURS",
                value: ttl_hours.to_string(),
            })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// issue
    ///
    /// Signs a fresh token for `username` with `role`, valid for the configured
    /// lifetime starting now.
    pub fn issue(&self, username: &str, role: Role) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Signs arbitrary claims with the service key.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// verify
    ///
    /// Checks the signature, the header algorithm, and the expiry of `token`.
    /// Pure: no I/O and no shared state is touched.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is exact; no clock-skew allowance.
        validation.leeway = 0;
        validation.validate_exp = true;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::AlgorithmMismatch
                }
                _ => TokenError::Malformed,
            })?;

        Ok(token_data.claims)
    }

    /// Token lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

/// authorize
///
/// Exact role equality. There is no hierarchy: an editor claim does not
/// implicitly satisfy a reader requirement.
pub fn authorize(claims: &Claims, required: Role) -> bool {
    claims.role == required
}
