//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/{prefix}/v1`:
//! - App routes for guests and signed-in users (auth, users, categories,
//!   tags, posts, comments, music catalog)
//! - Manage routes under `/manage`, which need `system-manage`

pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod middleware;
pub mod music;
pub mod posts;
pub mod rbac;
pub mod tags;
pub mod users;

#[cfg(test)]
mod tests;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the versioned API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Manage routes (need system-manage)
    let manage_routes = Router::new()
        .nest("/users", users::manage_router())
        .nest("/posts", posts::manage_router())
        .nest("/categories", categories::manage_router())
        .nest("/tags", tags::manage_router())
        .nest("/comments", comments::manage_router())
        .nest("/singers", music::manage_singer_router())
        .nest("/songs", music::manage_song_router())
        .nest("/song-lists", music::manage_song_list_router())
        .nest("/rbac", rbac::manage_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_manage,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a token, permissions checked per handler)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/posts", posts::protected_router())
        .nest("/comments", comments::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/users", users::router())
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .nest("/posts", posts::public_router())
        .nest("/comments", comments::public_router())
        .nest("/singer", music::singer_router())
        .nest("/song", music::song_router())
        .nest("/songList", music::song_list_router())
        .nest("/manage", manage_routes)
        .merge(protected_routes)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
        ])
        .expose_headers([HeaderName::from_static(middleware::TOKEN_HEADER)]);

    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => base
            .allow_origin(origin)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true),
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid CORS origin: {}", e);
            base.allow_origin(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => base
            .allow_origin(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let prefix = match server.prefix.trim_matches('/') {
        "" => "/v1".to_string(),
        prefix => format!("/{}/v1", prefix),
    };

    Router::new()
        .nest(&prefix, build_api_router(state.clone()))
        .layer(cors_layer(server.cors_origin.as_deref()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
