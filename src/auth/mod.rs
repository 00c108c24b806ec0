/// Authentication module
///
/// Password hashing, access token signing, refresh credentials, the session
/// store, and the service that ties them together.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod refresh_token;
pub mod service;
pub mod session;

pub use claims::Claims;
pub use jwt::{JwtCodec, TokenCodec, TokenError};
pub use password::{BcryptHasher, PasswordHasher, BCRYPT_COST};
pub use refresh_token::{InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshCredential, RefreshTokenStore};
pub use service::{AuthService, LoginOutcome, StoreHealth, TokenPair, TokenPolicy};
pub use session::{SessionRecord, SessionStore};
