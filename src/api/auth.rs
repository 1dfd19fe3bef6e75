//! Authentication API endpoints
//!
//! - POST /auth/register - Create an account
//! - POST /auth/login - Issue a token pair
//! - POST /auth/refresh - Trade a refresh token for a new pair
//! - POST /auth/logout - Revoke the current token
//! - GET /auth/profile - Current user
//! - PATCH /auth/profile - Update nickname, email or phone
//! - PATCH /auth/password - Change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{JsonBody, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{TokenPair, User};
use crate::services::{LoginInput, RegisterInput, UpdatePasswordInput, UpdateProfileInput};

/// Response for successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Routes that need no token
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/profile", get(profile).patch(update_profile))
        .route("/password", patch(update_password))
}

fn token_cookie(token: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!("token={}; Path=/; HttpOnly; SameSite=Lax", token))
        .map_err(|e| ApiError::internal_error(format!("Invalid cookie value: {}", e)))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth_service.register(body).await?;
    tracing::info!("Registered user {}", user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, tokens) = state.auth_service.login(body).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, token_cookie(&tokens.token)?);
    Ok((headers, Json(LoginResponse { user, tokens })))
}

/// POST /auth/refresh
async fn refresh(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.auth_service.refresh(&body.refresh_token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, token_cookie(&tokens.token)?);
    Ok((headers, Json(tokens)))
}

/// POST /auth/logout
async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.logout(&auth.token_id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((headers, Json(SuccessResponse::ok())))
}

/// GET /auth/profile
async fn profile(Extension(auth): Extension<AuthenticatedUser>) -> Json<User> {
    Json(auth.user)
}

/// PATCH /auth/profile
async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let user = state.auth_service.update_profile(&auth.user, body).await?;
    Ok(Json(user))
}

/// PATCH /auth/password
async fn update_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<UpdatePasswordInput>,
) -> Result<Json<User>, ApiError> {
    let user = state.auth_service.update_password(&auth.user, body).await?;
    tracing::info!("User {} changed password", user.username);
    Ok(Json(user))
}
