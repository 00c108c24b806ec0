/// Authentication Routes
///
/// Handles registration, login, logout and token refresh.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthService;
use crate::error::{AppError, ValidationError};
use crate::middleware::AuthenticatedUser;
use crate::models::UserResponse;
use crate::validators::{is_valid_email, is_valid_password, is_valid_username};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /auth/register
///
/// # Errors
/// - 400: Validation errors, or username / email already taken
/// - 503: A backing store is unavailable
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let username = is_valid_username(&form.username)?;
    let email = is_valid_email(&form.email)?;
    is_valid_password(&form.password)?;

    let user = auth.register(&username, &email, &form.password).await?;

    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// POST /auth/login
///
/// # Errors
/// - 400: Malformed email or empty password
/// - 401: Invalid credentials. Unknown email, wrong password and inactive
///   account share one response.
/// - 503: A backing store is unavailable
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()).into());
    }

    let outcome = auth.login(&email, &form.password).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        user: UserResponse::from(&outcome.user),
    }))
}

/// POST /auth/logout
///
/// **Requires a valid access token.** Ends the presented session and revokes
/// every refresh token of the caller.
pub async fn logout(
    caller: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&caller.access_token, caller.user_id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// POST /auth/refresh
///
/// Rotation: the presented refresh token is consumed and a new pair issued.
///
/// # Errors
/// - 400: Missing refresh token
/// - 401: Unknown, already used or expired refresh token
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    if form.refresh_token.trim().is_empty() {
        return Err(ValidationError::EmptyField("refreshToken".to_string()).into());
    }

    let tokens = auth.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}
