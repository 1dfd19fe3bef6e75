//! User API endpoints
//!
//! App routes (guest):
//! - GET /users - Live users
//! - GET /users/{id} - One live user
//!
//! Manage routes:
//! - GET /manage/users - Users in any trash state
//! - GET /manage/users/{id}
//! - POST /manage/users
//! - PATCH /manage/users
//! - DELETE /manage/users - Body `{ ids, trash }`
//! - PATCH /manage/users/restore - Body `{ ids }`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};

use crate::api::common::{AffectedResponse, JsonBody};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    CreateUserInput, IdsInput, Paginated, TrashMode, UpdateUserInput, User, UserQuery,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}", get(get_user))
}

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(manage_list_users)
                .post(create_user)
                .patch(update_user)
                .delete(delete_users),
        )
        .route("/restore", patch(restore_users))
        .route("/{id}", get(manage_get_user))
}

/// GET /users
async fn list_users(
    State(state): State<AppState>,
    Query(mut query): Query<UserQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    query.trashed = TrashMode::None;
    Ok(Json(state.user_service.paginate(&query).await?))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.detail(&id, false).await?))
}

/// GET /manage/users
async fn manage_list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    Ok(Json(state.user_service.paginate(&query).await?))
}

/// GET /manage/users/{id}
async fn manage_get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.detail(&id, true).await?))
}

/// POST /manage/users
async fn create_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PATCH /manage/users
async fn update_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update(body).await?))
}

/// DELETE /manage/users
async fn delete_users(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.user_service.delete(&body.ids, body.trash).await?;
    Ok(Json(affected.into()))
}

/// PATCH /manage/users/restore
async fn restore_users(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.user_service.restore(&body.ids).await?;
    Ok(Json(affected.into()))
}
