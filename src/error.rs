use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Provider error (status {status:?}): {details}")]
    Provider {
        status: Option<u16>,
        details: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Fetch(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Parse(_)
            | AppError::Provider { .. }
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(format!("Malformed multipart body: {}", err.body_text()))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AppError::UnsupportedMediaType("Expected a JSON body".to_string())
            }
            other => AppError::Validation(format!("Invalid JSON body: {}", other.body_text())),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation(format!("Expected a multipart form: {}", rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = match self {
            AppError::Validation(msg) | AppError::UnsupportedMediaType(msg) => json!({ "error": msg }),
            AppError::Fetch(_) => json!({ "error": "Could not download CSV from URL" }),
            AppError::Parse(_) => json!({ "error": "Failed to parse CSV" }),
            AppError::Provider { status, details } => json!({
                "error": "Completion request failed",
                "status": status,
                "details": details,
            }),
            AppError::Io(_) | AppError::Internal(_) => json!({ "error": "Internal server error" }),
        };

        (status, Json(body)).into_response()
    }
}
