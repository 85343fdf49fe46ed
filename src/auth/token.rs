//! Signing and verification of session tokens.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Role, SubjectId};

/// Payload carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (account ID)
    pub sub: SubjectId,
    /// Role granted to the subject
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Unique token ID
    pub jti: String,
}

/// Token signing or verification failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature was valid but `exp` has passed
    Expired,
    /// Bad signature, wrong secret, or not a token at all
    Invalid(String),
    /// Encoding a new token failed
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "Token has expired"),
            Self::Invalid(msg) => write!(f, "Invalid token: {}", msg),
            Self::Signing(msg) => write!(f, "Failed to sign token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// Current time as a Unix timestamp in seconds.
pub(crate) fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// HS256 signer bound to one secret and one token lifetime.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    leeway_seconds: u64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_seconds: i64, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_seconds;
        validation.validate_aud = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_seconds,
            leeway_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign a fresh token for `sub` with this signer's lifetime.
    pub fn issue(&self, sub: &SubjectId, role: &Role) -> Result<String, TokenError> {
        let iat = unix_now();
        let exp = (iat as i64).saturating_add(self.ttl_seconds).max(0) as u64;

        let claims = TokenClaims {
            sub: sub.clone(),
            role: role.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify the signature and expiry of `token` and return its claims.
    ///
    /// A token is expired once the current second reaches `exp`, so a token
    /// issued with a zero lifetime never verifies.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.exp.saturating_add(self.leeway_seconds) <= unix_now() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &Algorithm::HS256)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}
