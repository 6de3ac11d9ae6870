use crate::error::{AppError, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Bearer-token claims. The subject is the only thing the gateway consumes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    #[must_use]
    pub fn new(user_id: Uuid, ttl_secs: u64) -> Self {
        let now =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(std::time::Duration::from_secs(0)).as_secs()
                as usize;

        Self { sub: user_id, iat: now, exp: now + ttl_secs as usize }
    }

    /// Signs the claims with the server secret.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails.
    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes())).map_err(|_| AppError::Internal)
    }

    /// Verifies signature and expiry. Expiry is checked without leeway so a
    /// token is rejected the second after `exp`.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` on any invalid or expired token.
    pub fn decode(token: &str, secret: &str) -> Result<Self> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|_| AppError::AuthError)?;

        Ok(token_data.claims)
    }
}

/// Result of a successful token issuance.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_in: u64,
}
