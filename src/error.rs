//! API error types and HTTP response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::corpus_loader::CorpusError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        // The wire message is the bare detail; the variant prefix only
        // shows up in logs via Display.
        let message = match self {
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg
            }
            ApiError::Other(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<CorpusError> for ApiError {
    fn from(err: CorpusError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Convenience result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let (status, code) = ApiError::Unauthorized("no key".into()).status_and_code();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "UNAUTHORIZED");

        let (status, _) = ApiError::BadRequest("bad".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = ApiError::Internal("boom".into()).status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display_includes_detail() {
        let err = ApiError::Unauthorized("library credentials required".into());
        assert!(err.to_string().contains("library credentials required"));
    }
}
