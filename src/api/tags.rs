//! Tag API endpoints
//!
//! - GET /tags - Tags with post counts, paginated
//! - GET /tags/{id}
//!
//! Manage routes (`/manage/tags`) add create, update and delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::{AffectedResponse, JsonBody};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateTagInput, IdsInput, Paginated, Tag, TagQuery, UpdateTagInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{id}", get(get_tag))
}

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_tags)
                .post(create_tag)
                .patch(update_tag)
                .delete(delete_tags),
        )
        .route("/{id}", get(get_tag))
}

async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<Paginated<Tag>>, ApiError> {
    Ok(Json(state.tag_service.paginate(&query).await?))
}

async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.detail(&id).await?))
}

async fn create_tag(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateTagInput>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state.tag_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn update_tag(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdateTagInput>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.update(body).await?))
}

async fn delete_tags(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.tag_service.delete(&body.ids).await?;
    Ok(Json(affected.into()))
}
