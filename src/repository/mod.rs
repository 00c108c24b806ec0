/// User persistence
///
/// `UserRepository` is the seam between the services and the `users` table.
/// Uniqueness of username and email is enforced by the store itself and
/// reported as `StoreError::UniqueViolation`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewUser, User};

pub use self::memory::InMemoryUserRepository;
pub use self::postgres::PgUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new, active user stamped with `now`.
    async fn create(&self, user: &NewUser, now: DateTime<Utc>) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Overwrite the mutable columns of an existing row. `None` if the row is gone.
    async fn update(&self, user: &User) -> Result<Option<User>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// One page ordered by creation time, plus the total row count.
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
