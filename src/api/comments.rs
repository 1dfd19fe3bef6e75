//! Comment API endpoints
//!
//! - GET /comments/tree?post= - Comment threads
//! - GET /comments - Flattened threads, paginated
//! - POST /comments - Needs `comment.create`
//! - DELETE /comments - Needs ownership of every comment
//!
//! Manage routes (`/manage/comments`): listing and delete.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::common::{AffectedResponse, JsonBody};
use crate::api::middleware::{ensure_can, ensure_owner, ApiError, AppState, AuthenticatedUser};
use crate::models::{Comment, CommentQuery, CreateCommentInput, IdsInput, Paginated, PermissionAction};
use crate::services::rbac::subjects;

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    /// Post id
    pub post: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments))
        .route("/tree", get(comment_tree))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/", axum::routing::post(create_comment).delete(delete_comments))
}

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).delete(manage_delete_comments))
        .route("/tree", get(comment_tree))
}

/// GET /comments/tree
async fn comment_tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(state.comment_service.find_trees(query.post.as_deref()).await?))
}

/// GET /comments
async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Paginated<Comment>>, ApiError> {
    Ok(Json(state.comment_service.paginate(&query).await?))
}

/// POST /comments
async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_can(&state, &auth.user, PermissionAction::Create, subjects::COMMENT).await?;
    let comment = state.comment_service.create(body, &auth.user.id).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /comments
async fn delete_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let owners = state.comment_service.owner_ids(&body.ids).await?;
    ensure_owner(&state, &auth.user, subjects::COMMENT, &owners).await?;
    let affected = state.comment_service.delete(&body.ids).await?;
    Ok(Json(affected.into()))
}

/// DELETE /manage/comments
async fn manage_delete_comments(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.comment_service.delete(&body.ids).await?;
    Ok(Json(affected.into()))
}
