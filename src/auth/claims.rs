/// JWT Claims structure
///
/// Represents the payload of an access token (RFC 7519 registered claims).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    pub fn new(user_id: Uuid, issued_at: DateTime<Utc>, validity: Duration, issuer: String) -> Self {
        Self {
            sub: user_id.to_string(),
            exp: (issued_at + validity).timestamp(),
            iat: issued_at.timestamp(),
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Expired once `now` has reached the `exp` second
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}
