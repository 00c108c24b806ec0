/// Refresh Token Management
///
/// Refresh tokens are:
/// - 64 alphanumeric characters drawn from the OS random source
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: consumed on refresh, purged on logout
/// - Looked up by exact digest match only

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// A persisted refresh credential. The plaintext secret is never kept.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshCredential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Mint and persist a credential; returns the plaintext secret.
    async fn create(
        &self,
        user_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    async fn lookup(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError>;

    /// Delete-if-present in one step, returning what was removed.
    async fn take(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError>;

    /// Idempotent; returns whether a credential was removed.
    async fn delete(&self, secret: &str) -> Result<bool, StoreError>;

    /// Remove every credential of `user_id`; returns how many went away.
    async fn delete_all(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// Generate a new cryptographically secure refresh token
///
/// 64 base62 characters carry about 381 bits of entropy.
pub fn generate_refresh_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Postgres-backed refresh credentials (`refresh_tokens` table)
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let token = generate_refresh_token();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    async fn lookup(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError> {
        let credential = sqlx::query_as::<_, RefreshCredential>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(secret))
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn take(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError> {
        let credential = sqlx::query_as::<_, RefreshCredential>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(hash_token(secret))
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn delete(&self, secret: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(hash_token(secret))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(user_id = %user_id, revoked = result.rows_affected(), "All refresh tokens revoked for user");
        Ok(result.rows_affected())
    }
}

/// Process-local refresh credentials keyed by digest.
///
/// For local development and tests; state is lost on restart.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    credentials: RwLock<HashMap<String, RefreshCredential>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> usize {
        self.credentials
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let token = generate_refresh_token();
        let token_hash = hash_token(&token);

        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&token_hash) {
            return Err(StoreError::UniqueViolation("refresh_tokens_token_hash_key".to_string()));
        }
        credentials.insert(
            token_hash.clone(),
            RefreshCredential {
                id: Uuid::new_v4(),
                user_id,
                token_hash,
                expires_at,
                created_at: issued_at,
            },
        );

        Ok(token)
    }

    async fn lookup(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError> {
        Ok(self.credentials.read().await.get(&hash_token(secret)).cloned())
    }

    async fn take(&self, secret: &str) -> Result<Option<RefreshCredential>, StoreError> {
        Ok(self.credentials.write().await.remove(&hash_token(secret)))
    }

    async fn delete(&self, secret: &str) -> Result<bool, StoreError> {
        Ok(self.take(secret).await?.is_some())
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut credentials = self.credentials.write().await;
        let before = credentials.len();
        credentials.retain(|_, c| c.user_id != user_id);
        Ok((before - credentials.len()) as u64)
    }
}
