//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, logout and the caller's own
//! account.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use recall_core::{AccountUpdate, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::SESSION_COOKIE;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial account edit. Omitted or empty `password` keeps the current one.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub current_streak: i32,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            current_streak: user.current_streak,
            last_practiced_at: user.last_practiced_at,
            created_at: user.created_at,
        }
    }
}

/// Returned by signup and login. `session_token` is shown exactly once.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub session_token: String,
}

fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=None; Path=/",
        SESSION_COOKIE, token
    )
}

fn cleared_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0",
        SESSION_COOKIE
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/signup - Create a new user account and sign it in
#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state
        .accounts
        .signup(&req.name, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(AuthResponse {
            user: user.into(),
            session_token: token,
        }),
    ))
}

/// POST /api/login - Login with an existing account
///
/// Any session issued earlier for this account stops working.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state.accounts.login(&req.email, &req.password).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(AuthResponse {
            user: user.into(),
            session_token: token,
        }),
    ))
}

/// POST /api/logout - Revoke the current session
#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.logout(user.id).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_cookie())],
    ))
}

/// GET /api/me - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me_handler(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(user.into())
}

/// PATCH /api/me - Change name, email or password
#[utoipa::path(
    patch,
    path = "/api/me",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Email already registered or concurrent update")
    )
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .accounts
        .update_account(
            user.id,
            AccountUpdate {
                name: req.name,
                email: req.email,
                password: req.password,
            },
        )
        .await?;
    Ok(Json(updated.into()))
}
