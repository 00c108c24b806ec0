/// JWT Token Generation and Validation
///
/// Access tokens are HS256-signed JWTs. Verification pins the algorithm,
/// the issuer, and checks expiry against the injected clock.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::JwtSettings;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token algorithm is not accepted")]
    UnsupportedAlgorithm,
    #[error("token has expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

pub trait TokenCodec: Send + Sync {
    /// Sign a token for `subject` valid for `validity` from now.
    fn issue(&self, subject: Uuid, validity: Duration) -> Result<String, TokenError>;

    /// Verify signature, algorithm, issuer and expiry; return the subject.
    fn verify(&self, token: &str) -> Result<Uuid, TokenError>;
}

pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl JwtCodec {
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            clock,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against the injected clock below
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation
    }
}

impl TokenCodec for JwtCodec {
    fn issue(&self, subject: Uuid, validity: Duration) -> Result<String, TokenError> {
        let claims = Claims::new(subject, self.clock.now(), validity, self.issuer.clone());

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::InvalidSignature)?;
        if header.alg != ALGORITHM {
            tracing::warn!(algorithm = ?header.alg, "Rejected token with unexpected algorithm");
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!("JWT validation error: {}", e);
                    TokenError::InvalidSignature
                }
            })?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }

        claims.user_id().ok_or(TokenError::InvalidSignature)
    }
}
