//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - The `ApiError` envelope and the conversions from service errors
//! - Authentication (access token validation with transparent refresh)
//! - Authorization (system-manage guard and per-handler ability checks)

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{PermissionAction, User};
use crate::services::{
    Ability, AuthService, AuthServiceError, CategoryService, CategoryServiceError, CommentService,
    CommentServiceError, MusicService, MusicServiceError, PostService, PostServiceError,
    RbacResolver, TagService, TagServiceError, TokenService, UserService, UserServiceError,
};

/// Response header carrying a token issued by transparent refresh
pub const TOKEN_HEADER: &str = "token";

const TOKEN_COOKIE: &str = "token=";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub token_service: Arc<TokenService>,
    pub user_service: Arc<UserService>,
    pub rbac: Arc<RbacResolver>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub post_service: Arc<PostService>,
    pub comment_service: Arc<CommentService>,
    pub music_service: Arc<MusicService>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    /// Id of the access token in effect for this request
    pub token_id: String,
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        ApiError::internal_error("Internal server error")
    }
}

// Each service error keeps its message; NotFound uses the full display text
// so the entity kind is named.
macro_rules! impl_from_service_error {
    ($($ty:ident { $($variant:ident => $ctor:ident),* $(,)? }),* $(,)?) => {
        $(
            impl From<$ty> for ApiError {
                fn from(err: $ty) -> Self {
                    let message = err.to_string();
                    match err {
                        $ty::NotFound(_) => ApiError::not_found(message),
                        $($ty::$variant(msg) => ApiError::$ctor(msg),)*
                        $ty::InternalError(e) => ApiError::from(e),
                    }
                }
            }
        )*
    };
}

impl_from_service_error!(
    AuthServiceError {
        Unauthorized => unauthorized,
        Forbidden => forbidden,
        ValidationError => validation_error,
        Conflict => conflict,
    },
    UserServiceError {
        ValidationError => validation_error,
        Conflict => conflict,
    },
    CategoryServiceError {
        ValidationError => validation_error,
        Conflict => conflict,
    },
    TagServiceError {
        ValidationError => validation_error,
        Conflict => conflict,
    },
    PostServiceError {
        ValidationError => validation_error,
    },
    CommentServiceError {
        ValidationError => validation_error,
        Forbidden => forbidden,
    },
    MusicServiceError {
        ValidationError => validation_error,
    },
);

/// Extract the access token from the request.
///
/// A Bearer `Authorization` header wins over the `token` cookie.
pub(crate) fn extract_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix(TOKEN_COOKIE) {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
///
/// An expired token with a live refresh token is renewed on the way; the
/// new access token is sent back in the `token` response header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let authenticated = state
        .auth_service
        .authenticate(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let renewed = authenticated.renewed.map(|pair| pair.token);
    request.extensions_mut().insert(AuthenticatedUser {
        user: authenticated.user,
        token_id: authenticated.token_id,
    });

    let mut response = next.run(request).await;
    if let Some(token) = renewed {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(TOKEN_HEADER), value);
            }
            Err(e) => tracing::warn!("Renewed token is not a valid header value: {}", e),
        }
    }
    Ok(response)
}

/// Manage routes: the user needs `system-manage`
pub async fn require_manage(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let ability = state.rbac.ability_for(&auth.user.id).await?;
    if !ability.is_system_manager() {
        tracing::debug!("User {} denied manage access", auth.user.id);
        return Err(ApiError::forbidden("System manage permission required"));
    }

    Ok(next.run(request).await)
}

/// Ability of the current user
pub async fn ability_of(state: &AppState, user: &User) -> Result<Ability, ApiError> {
    Ok(state.rbac.ability_for(&user.id).await?)
}

/// Fail unless the user may perform `action` on `subject`
pub async fn ensure_can(
    state: &AppState,
    user: &User,
    action: PermissionAction,
    subject: &str,
) -> Result<Ability, ApiError> {
    let ability = ability_of(state, user).await?;
    if !ability.can(action, subject) {
        return Err(ApiError::forbidden(format!(
            "Missing {} permission on {}",
            action, subject
        )));
    }
    Ok(ability)
}

/// Fail unless the user manages `subject` or authored every item
pub async fn ensure_owner(
    state: &AppState,
    user: &User,
    subject: &str,
    owner_ids: &[String],
) -> Result<Ability, ApiError> {
    let ability = ability_of(state, user).await?;
    if !ability.can_own(subject, owner_ids, &user.id) {
        return Err(ApiError::forbidden(format!(
            "You do not own the requested {}",
            subject
        )));
    }
    Ok(ability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, format!("theme=dark; token={}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(extract_token(&request), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let request = create_request_with_cookie("test-token-456");
        assert_eq!(extract_token(&request), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "token=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&request), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_token(&request).is_none());

        let basic = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .body(Body::empty())
            .unwrap();
        assert!(extract_token(&basic).is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("TEAPOT", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_errors_convert() {
        let err = ApiError::from(CommentServiceError::Forbidden(
            "Parent comment and child comment must belong same post!".to_string(),
        ));
        assert_eq!(err.error.code, "FORBIDDEN");
        assert_eq!(
            err.error.message,
            "Parent comment and child comment must belong same post!"
        );

        let err = ApiError::from(PostServiceError::NotFound("p1".to_string()));
        assert_eq!(err.error.code, "NOT_FOUND");
        assert_eq!(err.error.message, "Post not found: p1");

        let err = ApiError::from(UserServiceError::Conflict("username".to_string()));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(TagServiceError::InternalError(anyhow::anyhow!("db down")));
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains("db down"));
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "username"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
        let json = serde_json::to_value(ApiError::forbidden("no")).unwrap();
        assert!(json["error"].get("details").is_none());
    }
}
