//! Service-level errors and their HTTP mapping (§7).

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] fluxgraph_engine::EngineError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: missing scope '{0}'")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    fn status_and_kind(&self) -> (StatusCode, String) {
        match self {
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation".to_string()),
            ServiceError::Engine(err) => {
                let kind = err.kind_tag();
                let status = match kind {
                    "validation" | "cycle" => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, kind.to_string())
            }
            ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, "auth".to_string()),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "auth".to_string()),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found".to_string()),
            ServiceError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limit".to_string()),
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage".to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = self.to_string();
        let retry_after = match &self {
            ServiceError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = (status, Json(json!({ "message": message, "type": kind }))).into_response();

        if let Some(retry_after_secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("X-RateLimit-Reset", value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
