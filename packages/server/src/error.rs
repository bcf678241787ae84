use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::ContentError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `PAYLOAD_TOO_LARGE`, `TOKEN_MISSING`, `TOKEN_INVALID`,
    /// `PERMISSION_DENIED`, `NOT_FOUND`, `CORRUPTED`, `UNAVAILABLE`,
    /// `TIMEOUT`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Invalid filename: path separators are not allowed")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    PayloadTooLarge { actual: u64, limit: u64 },
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Corrupted(String),
    Unavailable(String),
    Timeout(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::PayloadTooLarge { actual, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "PAYLOAD_TOO_LARGE",
                    message: format!("Payload of {actual} bytes exceeds the {limit} byte limit"),
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Corrupted(detail) => {
                tracing::error!("Corrupted content: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "CORRUPTED",
                        message: detail,
                    },
                )
            }
            AppError::Unavailable(detail) => {
                tracing::warn!("Backend unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "UNAVAILABLE",
                        message: "A storage backend is unavailable, try again later".into(),
                    },
                )
            }
            AppError::Timeout(detail) => {
                tracing::warn!("Backend timeout: {}", detail);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorBody {
                        code: "TIMEOUT",
                        message: detail,
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Validation(msg) => AppError::Validation(msg),
            ContentError::PayloadTooLarge { actual, limit } => {
                AppError::PayloadTooLarge { actual, limit }
            }
            ContentError::NotFound(filename) => {
                AppError::NotFound(format!("Content '{filename}' not found"))
            }
            ContentError::Corrupted { filename, detail } => {
                AppError::Corrupted(format!("Content '{filename}' is corrupted: {detail}"))
            }
            ContentError::Unavailable(detail) => AppError::Unavailable(detail),
            ContentError::Timeout(limit) => {
                AppError::Timeout(format!("Backend call timed out after {limit:?}"))
            }
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}
