//! RBAC listing endpoints (manage only)
//!
//! - GET /manage/rbac/roles
//! - GET /manage/rbac/permissions

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Permission, Role};

pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/permissions", get(list_permissions))
}

async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.rbac.roles().await?))
}

async fn list_permissions(State(state): State<AppState>) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(state.rbac.permissions().await?))
}
