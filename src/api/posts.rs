//! Post API endpoints
//!
//! App routes:
//! - GET /posts - Published, untrashed posts
//! - GET /posts/{id} - One published, untrashed post
//! - GET /posts/owner - The caller's posts in any state
//! - GET /posts/owner/{id} - One of the caller's posts
//! - POST /posts - Needs `post.create`
//! - PATCH /posts, DELETE /posts, PATCH /posts/restore - Need ownership
//!
//! Manage routes (`/manage/posts`) cover every post without ownership checks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Extension, Json, Router,
};

use crate::api::common::{AffectedResponse, JsonBody};
use crate::api::middleware::{ensure_can, ensure_owner, ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreatePostInput, IdsInput, Paginated, PermissionAction, Post, PostQuery, TrashMode,
    UpdatePostInput,
};
use crate::services::rbac::subjects;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{id}", get(get_post))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_post).patch(update_post).delete(delete_posts))
        .route("/restore", patch(restore_posts))
        .route("/owner", get(list_own_posts))
        .route("/owner/{id}", get(get_own_post))
}

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(manage_list_posts)
                .post(manage_create_post)
                .patch(manage_update_post)
                .delete(manage_delete_posts),
        )
        .route("/restore", patch(manage_restore_posts))
        .route("/{id}", get(manage_get_post))
}

/// GET /posts
async fn list_posts(
    State(state): State<AppState>,
    Query(mut query): Query<PostQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    query.is_published = Some(true);
    query.trashed = TrashMode::None;
    Ok(Json(state.post_service.paginate(&query).await?))
}

/// GET /posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.published_detail(&id).await?))
}

/// GET /posts/owner
async fn list_own_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(mut query): Query<PostQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    query.author = Some(auth.user.id);
    Ok(Json(state.post_service.paginate(&query).await?))
}

/// GET /posts/owner/{id}
async fn get_own_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let post = state.post_service.detail(&id, true).await?;
    ensure_owner(&state, &auth.user, subjects::POST, &[post.author.id.clone()]).await?;
    Ok(Json(post))
}

/// POST /posts
async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(mut body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ability = ensure_can(&state, &auth.user, PermissionAction::Create, subjects::POST).await?;
    // only managers may post on behalf of someone else
    if !ability.can(PermissionAction::Manage, subjects::POST) {
        body.author = None;
    }
    let post = state.post_service.create(body, &auth.user.id).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PATCH /posts
async fn update_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(mut body): Json<UpdatePostInput>,
) -> Result<Json<Post>, ApiError> {
    let owners = state.post_service.owner_ids(&[body.id.clone()]).await?;
    let ability = ensure_owner(&state, &auth.user, subjects::POST, &owners).await?;
    if !ability.can(PermissionAction::Manage, subjects::POST) {
        body.author = None;
    }
    Ok(Json(state.post_service.update(body).await?))
}

/// DELETE /posts
async fn delete_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let owners = state.post_service.owner_ids(&body.ids).await?;
    ensure_owner(&state, &auth.user, subjects::POST, &owners).await?;
    let affected = state.post_service.delete(&body.ids, body.trash).await?;
    Ok(Json(affected.into()))
}

/// PATCH /posts/restore
async fn restore_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let owners = state.post_service.owner_ids(&body.ids).await?;
    ensure_owner(&state, &auth.user, subjects::POST, &owners).await?;
    let affected = state.post_service.restore(&body.ids).await?;
    Ok(Json(affected.into()))
}

/// GET /manage/posts
async fn manage_list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    Ok(Json(state.post_service.paginate(&query).await?))
}

/// GET /manage/posts/{id}
async fn manage_get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.detail(&id, true).await?))
}

/// POST /manage/posts
async fn manage_create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    JsonBody(body): JsonBody<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(body, &auth.user.id).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PATCH /manage/posts
async fn manage_update_post(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdatePostInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.update(body).await?))
}

/// DELETE /manage/posts
async fn manage_delete_posts(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.post_service.delete(&body.ids, body.trash).await?;
    Ok(Json(affected.into()))
}

/// PATCH /manage/posts/restore
async fn manage_restore_posts(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.post_service.restore(&body.ids).await?;
    Ok(Json(affected.into()))
}
