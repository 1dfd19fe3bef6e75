//! Common API utilities and shared types

use axum::extract::{rejection::JsonRejection, FromRequest};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ApiError;

/// JSON request body whose rejections use the `ApiError` envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::with_details(
            "VALIDATION_ERROR",
            "Invalid request body",
            serde_json::json!({ "reason": rejection.body_text() }),
        )
    }
}

/// Rows touched by a batch delete or restore
#[derive(Debug, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

impl From<u64> for AffectedResponse {
    fn from(affected: u64) -> Self {
        Self { affected }
    }
}

/// Empty success body
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
