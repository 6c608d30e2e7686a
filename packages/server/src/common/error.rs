use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error kinds surfaced by the transfer pipeline core.
///
/// `TransientIOError` is retried by `RetryPolicy`; the rest are not. `MetadataError`
/// never downgrades an item that already reached success/skipped.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transient I/O error: {0}")]
    TransientIO(String),

    #[error("permanent I/O error: {0}")]
    PermanentIO(String),

    #[error("ambiguous upload for item {item_id}")]
    AmbiguousUpload { item_id: uuid::Uuid },

    #[error("metadata operation failed: {0}")]
    Metadata(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TransferError {
    /// Whether the caller should retry the operation that produced this error,
    /// per the dispositions enumerated in the error-handling design.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::TransientIO(_))
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = match &self {
            TransferError::Validation(_) => StatusCode::BAD_REQUEST,
            TransferError::Auth(_) => StatusCode::UNAUTHORIZED,
            TransferError::NotFound(_) => StatusCode::NOT_FOUND,
            TransferError::AmbiguousUpload { .. } => StatusCode::CONFLICT,
            TransferError::TransientIO(_) | TransferError::PermanentIO(_) | TransferError::Metadata(_) => {
                StatusCode::BAD_GATEWAY
            }
            TransferError::DataIntegrity(_) | TransferError::Database(_) | TransferError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_io_is_retryable() {
        assert!(TransferError::TransientIO("timeout".into()).is_retryable());

        assert!(!TransferError::Validation("bad input".into()).is_retryable());
        assert!(!TransferError::Auth("rejected".into()).is_retryable());
        assert!(!TransferError::PermanentIO("404".into()).is_retryable());
        assert!(!TransferError::DataIntegrity("checksum mismatch".into()).is_retryable());
        assert!(!TransferError::NotFound("item".into()).is_retryable());
        assert!(!TransferError::Metadata("title rejected".into()).is_retryable());
        assert!(!TransferError::AmbiguousUpload { item_id: uuid::Uuid::nil() }.is_retryable());
    }
}
