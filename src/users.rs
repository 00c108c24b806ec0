/// User Management
///
/// Reads, pages, updates and deletes accounts. Changing a password or
/// deactivating an account revokes every credential the user holds; deleting
/// an account does the same before the row goes away.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::service::with_deadline;
use crate::auth::AuthService;
use crate::clock::Clock;
use crate::error::{AppError, AuthError, ValidationError};
use crate::models::{UpdateUser, User};
use crate::repository::UserRepository;
use crate::validators::{is_valid_email, is_valid_password, is_valid_username};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Page coordinates taken from the query string.
///
/// Unparseable or out-of-range values fall back to the defaults rather than
/// failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(DEFAULT_PAGE);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .unwrap_or(DEFAULT_LIMIT);

        Self { page, limit }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    auth: Arc<AuthService>,
    clock: Arc<dyn Clock>,
}

// Blank strings in an update mean "leave unchanged"
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, auth: Arc<AuthService>, clock: Arc<dyn Clock>) -> Self {
        Self { users, auth, clock }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        with_deadline(self.auth.store_timeout(), self.users.find_by_id(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", id)))
    }

    pub async fn list(&self, request: PageRequest) -> Result<UserPage, AppError> {
        let (users, total) = with_deadline(
            self.auth.store_timeout(),
            self.users.list(request.offset(), request.limit),
        )
        .await?;

        Ok(UserPage {
            users,
            total,
            page: request.page,
            limit: request.limit,
        })
    }

    /// Apply the fields present in `update`. An update with nothing to apply
    /// is rejected.
    pub async fn update(&self, id: Uuid, update: UpdateUser) -> Result<User, AppError> {
        if update.is_empty() {
            return Err(ValidationError::EmptyField("update".to_string()).into());
        }

        let timeout = self.auth.store_timeout();
        let mut user = self.get(id).await?;
        let was_active = user.is_active;

        if let Some(username) = present(&update.username) {
            let username = is_valid_username(username)?;
            if username != user.username {
                if let Some(other) = with_deadline(timeout, self.users.find_by_username(&username)).await? {
                    if other.id != id {
                        return Err(AuthError::Conflict.into());
                    }
                }
                user.username = username;
            }
        }

        if let Some(email) = present(&update.email) {
            let email = is_valid_email(email)?;
            if email != user.email {
                if let Some(other) = with_deadline(timeout, self.users.find_by_email(&email)).await? {
                    if other.id != id {
                        return Err(AuthError::Conflict.into());
                    }
                }
                user.email = email;
            }
        }

        let password_changed = match present(&update.password) {
            Some(password) => {
                is_valid_password(password)?;
                user.password_hash = self.auth.hash_password(password).await?;
                true
            }
            None => false,
        };

        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }

        user.updated_at = self.clock.now();
        let user = with_deadline(timeout, self.users.update(&user))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;

        if password_changed || (was_active && !user.is_active) {
            self.auth.revoke_all(id).await?;
        }

        tracing::info!(
            user_id = %id,
            password_changed = password_changed,
            is_active = user.is_active,
            "User updated"
        );
        Ok(user)
    }

    /// Delete `id` on behalf of `actor`. Users cannot delete themselves.
    pub async fn delete(&self, actor: Uuid, id: Uuid) -> Result<(), AppError> {
        if actor == id {
            return Err(AppError::Forbidden("Cannot delete your own account".to_string()));
        }

        self.get(id).await?;
        self.auth.revoke_all(id).await?;

        if !with_deadline(self.auth.store_timeout(), self.users.delete(id)).await? {
            return Err(AppError::NotFound(format!("user {}", id)));
        }

        tracing::info!(user_id = %id, deleted_by = %actor, "User deleted");
        Ok(())
    }
}
