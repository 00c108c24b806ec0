/// Authentication orchestrator
///
/// Coordinates the user repository, the refresh credential store, the session
/// store, the password hasher and the token codec. A credential moves through
/// unauthenticated -> active -> rotated -> revoked; revoked is terminal.
///
/// Every store round-trip is bounded by `TokenPolicy::store_timeout`. A call
/// that overruns is dropped and reported as `StoreUnavailable`. Nothing is
/// retried here.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::auth::session::SessionStore;
use crate::clock::Clock;
use crate::configuration::Settings;
use crate::error::{AuthError, StoreError};
use crate::models::{NewUser, User};
use crate::repository::UserRepository;

/// Lifetimes and deadlines applied by the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_timeout: std::time::Duration,
}

impl TokenPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            access_ttl: settings.jwt.access_token_ttl(),
            refresh_ttl: settings.jwt.refresh_token_ttl(),
            store_timeout: settings.application.store_timeout(),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            store_timeout: std::time::Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

/// Liveness of the two backing stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub database: bool,
    pub cache: bool,
}

/// Run one store call, dropping it once `deadline` passes.
pub async fn with_deadline<T, F>(deadline: std::time::Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = deadline.as_millis() as u64, "Store call exceeded deadline");
            Err(StoreError::Timeout)
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    sessions: SessionStore,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
    /// Digest checked against when the email is unknown
    decoy_digest: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        sessions: SessionStore,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenCodec>,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            sessions,
            hasher,
            tokens,
            clock,
            policy,
            decoy_digest: OnceCell::new(),
        }
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_deadline(self.policy.store_timeout, call)
            .await
            .map_err(AuthError::from)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        self.policy.store_timeout
    }

    /// Hash on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: &str, digest: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let digest = digest.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))
    }

    /// Spend one verify on a digest nobody owns.
    ///
    /// The digest is made once with the configured hasher, so it carries the
    /// same work factor as real accounts.
    async fn verify_decoy(&self, password: &str) -> Result<(), AuthError> {
        let digest = self
            .decoy_digest
            .get_or_try_init(|| self.hash_password("user_auth-decoy-password"))
            .await?;
        self.verify_password(password, digest).await?;
        Ok(())
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self
            .tokens
            .issue(user_id, self.policy.access_ttl)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let session_ttl = self
            .policy
            .access_ttl
            .to_std()
            .map_err(|e| AuthError::Internal(format!("Invalid access token lifetime: {}", e)))?;

        self.guarded(self.sessions.create(user_id, &access_token, session_ttl))
            .await?;

        let now = self.clock.now();
        let refresh_token = self
            .guarded(self.refresh_tokens.create(user_id, now, now + self.policy.refresh_ttl))
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Create an account. Inputs are expected to be validated already.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User, AuthError> {
        if self.guarded(self.users.find_by_username(username)).await?.is_some() {
            tracing::info!("Registration rejected: username taken");
            return Err(AuthError::Conflict);
        }
        if self.guarded(self.users.find_by_email(email)).await?.is_some() {
            tracing::info!("Registration rejected: email taken");
            return Err(AuthError::Conflict);
        }

        let password_hash = self.hash_password(password).await?;
        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        };

        // A concurrent registration can still win the insert; the unique
        // constraint turns that into Conflict.
        let user = self
            .guarded(self.users.create(&new_user, self.clock.now()))
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Unknown email, wrong password and inactive account are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = match self.guarded(self.users.find_by_email(email)).await? {
            Some(user) => user,
            None => {
                self.verify_decoy(password).await?;
                tracing::warn!("Login failed: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login failed: account inactive");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_tokens(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome { user, tokens })
    }

    /// Resolve an access token to its user id.
    ///
    /// The session record must exist, the token must verify, and both must
    /// name the same user.
    pub async fn validate(&self, access_token: &str) -> Result<Uuid, AuthError> {
        let session = self
            .guarded(self.sessions.get(access_token))
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let subject = self.tokens.verify(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::Unauthorized
        })?;

        if subject != session.user_id {
            tracing::warn!(
                user_id = %session.user_id,
                "Access token subject does not match its session"
            );
            return Err(AuthError::Unauthorized);
        }

        Ok(subject)
    }

    /// Exchange a refresh credential for a new pair.
    ///
    /// The presented credential is consumed before anything is issued, so it
    /// succeeds at most once. The session of the superseded access token is
    /// left to expire on its own.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let credential = match self.guarded(self.refresh_tokens.take(refresh_token)).await? {
            Some(credential) => credential,
            None => {
                tracing::warn!("Refresh failed: unknown or already used token");
                return Err(AuthError::InvalidToken);
            }
        };

        if credential.is_expired_at(self.clock.now()) {
            tracing::info!(user_id = %credential.user_id, "Refresh failed: token expired");
            return Err(AuthError::Expired);
        }

        match self.guarded(self.users.find_by_id(credential.user_id)).await? {
            Some(user) if user.is_active => {}
            _ => {
                tracing::warn!(user_id = %credential.user_id, "Refresh failed: account missing or inactive");
                return Err(AuthError::InvalidToken);
            }
        }

        let tokens = self.issue_tokens(credential.user_id).await?;

        tracing::info!(user_id = %credential.user_id, "Tokens rotated");
        Ok(tokens)
    }

    /// End one session and revoke every refresh credential of the user.
    pub async fn logout(&self, access_token: &str, user_id: Uuid) -> Result<(), AuthError> {
        self.guarded(self.sessions.delete(access_token)).await?;
        let revoked = self
            .guarded(self.refresh_tokens.delete_all(user_id))
            .await?;

        tracing::info!(user_id = %user_id, refresh_tokens_revoked = revoked, "User logged out");
        Ok(())
    }

    /// Drop every session and refresh credential of the user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.guarded(self.sessions.delete_all(user_id)).await?;
        self.guarded(self.refresh_tokens.delete_all(user_id))
            .await?;

        tracing::info!(user_id = %user_id, "All credentials revoked");
        Ok(())
    }

    pub async fn check_stores(&self) -> StoreHealth {
        let database = self.guarded(self.users.ping()).await;
        let cache = self.guarded(self.sessions.ping()).await;

        if let Err(e) = &database {
            tracing::error!(error = %e, "Database health check failed");
        }
        if let Err(e) = &cache {
            tracing::error!(error = %e, "Cache health check failed");
        }

        StoreHealth {
            database: database.is_ok(),
            cache: cache.is_ok(),
        }
    }
}
