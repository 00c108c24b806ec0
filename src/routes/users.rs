/// User Routes
///
/// All handlers sit behind the authentication middleware.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ValidationError};
use crate::middleware::AuthenticatedUser;
use crate::models::{UpdateUser, UserResponse};
use crate::routes::auth::MessageResponse;
use crate::users::{PageRequest, UserService};

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidFormat("user id".to_string()).into())
}

/// GET /users?page&limit
pub async fn list_users(
    query: web::Query<ListQuery>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let request = PageRequest::from_query(query.page.as_deref(), query.limit.as_deref());
    let page = users.list(request).await?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        users: page.users.iter().map(UserResponse::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// GET /users/profile
pub async fn get_profile(
    caller: web::ReqData<AuthenticatedUser>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.get(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// PUT /users/profile
///
/// The active flag cannot be changed through the profile.
pub async fn update_profile(
    caller: web::ReqData<AuthenticatedUser>,
    body: web::Json<UpdateUser>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let mut update = body.into_inner();
    update.is_active = None;

    let user = users.update(caller.user_id, update).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// GET /users/{id}
pub async fn get_user(
    path: web::Path<String>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.get(parse_user_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// PUT /users/{id}
pub async fn update_user(
    path: web::Path<String>,
    body: web::Json<UpdateUser>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.update(parse_user_id(&path)?, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// DELETE /users/{id}
///
/// # Errors
/// - 403: The caller tried to delete their own account
/// - 404: No such user
pub async fn delete_user(
    caller: web::ReqData<AuthenticatedUser>,
    path: web::Path<String>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    users.delete(caller.user_id, parse_user_id(&path)?).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}
