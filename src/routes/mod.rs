mod auth;
mod health_check;
mod users;

pub use auth::{login, logout, refresh, register};
pub use health_check::health_check;
pub use users::{delete_user, get_profile, get_user, list_users, update_profile, update_user};
