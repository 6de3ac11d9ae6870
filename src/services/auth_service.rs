use crate::config::AuthConfig;
use crate::domain::auth::{Claims, IssuedToken};
use crate::error::{AppError, Result};
use crate::storage::DbPool;
use crate::storage::user_repo::UserRepository;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use uuid::Uuid;

/// Issues and verifies the short-lived bearer tokens consumed by the
/// WebSocket upgrade. Authentication is proof-of-possession of the identity
/// key a user already advertises to peers; there is deliberately no password
/// path.
#[derive(Clone, Debug)]
pub struct AuthService {
    pool: DbPool,
    repo: UserRepository,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: UserRepository, config: AuthConfig) -> Self {
        Self { pool, repo, config }
    }

    /// Issues a bearer token after verifying that `signature_hex` signs
    /// `nonce` under the caller's stored identity key.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` for an unknown user or a failed
    /// signature check, `AppError::Database` on storage failure.
    #[tracing::instrument(err(level = "debug"), skip(self, nonce, signature_hex))]
    pub async fn issue_token(&self, phone_hash: &str, nonce: &str, signature_hex: &str) -> Result<IssuedToken> {
        let mut conn = self.pool.acquire().await?;

        let material = self.repo.find_auth_material(&mut conn, phone_hash).await?.ok_or(AppError::AuthError)?;

        verify_possession(&material.identity_key, nonce, signature_hex)?;

        self.repo.touch_last_seen(&mut conn, material.user_id).await?;

        let claims = Claims::new(material.user_id, self.config.token_ttl_secs);
        let token = claims.encode(&self.config.secret_key)?;

        tracing::debug!(user_id = %material.user_id, "Issued bearer token");

        Ok(IssuedToken { token, user_id: material.user_id, expires_in: self.config.token_ttl_secs })
    }

    /// Verifies a bearer token and returns its subject. Never extends
    /// validity.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` for an invalid or expired token.
    pub fn verify_token(&self, token: &str) -> Result<Uuid> {
        Claims::decode(token, &self.config.secret_key).map(|claims| claims.sub)
    }
}

/// Checks that `signature_hex` is a valid Ed25519 signature of `nonce` under
/// `identity_key`. A stored key that does not parse as an Ed25519 point
/// fails the same way as a bad signature; the server never constrained key
/// shape at registration.
pub(crate) fn verify_possession(identity_key: &[u8], nonce: &str, signature_hex: &str) -> Result<()> {
    let key_bytes: [u8; 32] = identity_key.try_into().map_err(|_| AppError::AuthError)?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| AppError::AuthError)?;

    let raw = hex::decode(signature_hex).map_err(|_| AppError::AuthError)?;
    let sig_bytes: [u8; 64] = raw.as_slice().try_into().map_err(|_| AppError::AuthError)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key.verify(nonce.as_bytes(), &signature).map_err(|_| AppError::AuthError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, Vec<u8>) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let public = signing_key.verifying_key().to_bytes().to_vec();
        (signing_key, public)
    }

    #[test]
    fn valid_signature_accepted() {
        let (signing_key, public) = keypair();
        let nonce = "a-nonce-long-enough-to-be-plausible";
        let signature = hex::encode(signing_key.sign(nonce.as_bytes()).to_bytes());

        assert!(verify_possession(&public, nonce, &signature).is_ok());
    }

    #[test]
    fn signature_over_different_nonce_rejected() {
        let (signing_key, public) = keypair();
        let signature = hex::encode(signing_key.sign(b"nonce-one").to_bytes());

        assert!(matches!(verify_possession(&public, "nonce-two", &signature), Err(AppError::AuthError)));
    }

    #[test]
    fn stored_key_of_wrong_length_rejected() {
        let (signing_key, _) = keypair();
        let nonce = "whatever-nonce";
        let signature = hex::encode(signing_key.sign(nonce.as_bytes()).to_bytes());

        assert!(matches!(verify_possession(b"IK", nonce, &signature), Err(AppError::AuthError)));
    }

    #[test]
    fn non_hex_signature_rejected() {
        let (_, public) = keypair();
        assert!(matches!(verify_possession(&public, "nonce", "zz".repeat(64).as_str()), Err(AppError::AuthError)));
    }
}
