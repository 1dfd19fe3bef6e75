//! Category API endpoints
//!
//! App routes:
//! - GET /categories/tree - Nested category forest
//! - GET /categories - Flattened tree, paginated
//! - GET /categories/{id} - Category with its parent
//!
//! Manage routes (`/manage/categories`): list, detail, create, update, delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::{AffectedResponse, JsonBody};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    Category, CategoryQuery, CreateCategoryInput, IdsInput, Paginated, UpdateCategoryInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/tree", get(category_tree))
        .route("/{id}", get(get_category))
}

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_categories)
                .post(create_category)
                .patch(update_category)
                .delete(delete_categories),
        )
        .route("/tree", get(category_tree))
        .route("/{id}", get(get_category))
}

/// GET /categories/tree
async fn category_tree(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.find_trees().await?))
}

/// GET /categories
async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Paginated<Category>>, ApiError> {
    Ok(Json(state.category_service.paginate(&query).await?))
}

/// GET /categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.detail(&id).await?))
}

/// POST /manage/categories
async fn create_category(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PATCH /manage/categories
async fn update_category(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(body).await?))
}

/// DELETE /manage/categories
async fn delete_categories(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsInput>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let affected = state.category_service.delete(&body.ids).await?;
    Ok(Json(affected.into()))
}
