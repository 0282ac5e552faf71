use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid main file: {message}")]
    InvalidMainFile { message: String },

    #[error("Missing form field: {field}")]
    MissingField { field: String },

    #[error("Malformed upload: {message}")]
    MalformedUpload { message: String },

    #[error("Upload field {field} exceeds {limit} bytes")]
    PayloadTooLarge { field: String, limit: usize },

    #[error("Invalid archive: {message}")]
    InvalidArchive { message: String },

    #[error("Unsafe archive entry: {entry}")]
    UnsafeArchive { entry: String },

    #[error("Archive too large: {size} bytes exceeds {limit} bytes")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("LaTeX compilation failed with status {status:?}")]
    CompilationFailed {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("LaTeX engine not found: {engine}")]
    EngineNotFound { engine: String },

    #[error("PDF output missing: {expected}")]
    PdfMissing { expected: String },

    #[error("Compilation timed out after {timeout_seconds} seconds")]
    TimeoutError { timeout_seconds: u64 },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

/// Which side of the service an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is wrong; fix the input.
    ClientInput,
    /// Deployment or configuration problem.
    Environment,
    /// The input may be fine but took too long; retry or simplify.
    Timeout,
    Internal,
}

/// JSON error body: `{"detail": ..., "error_code": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: ErrorDetail,
    pub error_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Compilation {
        message: String,
        stdout: String,
        stderr: String,
    },
}

pub struct ErrorHandler;

impl ErrorHandler {
    /// Converts an AppError into a status code and client-facing body
    pub fn handle_error(error: &AppError) -> (StatusCode, ErrorResponse) {
        let (status, error_code, detail) = match error {
            AppError::InvalidMainFile { .. } => (
                StatusCode::BAD_REQUEST,
                "INVALID_MAIN_FILE",
                ErrorDetail::Message("Uploaded file must have a .tex extension.".to_string()),
            ),

            AppError::MissingField { field } => (
                StatusCode::BAD_REQUEST,
                "MISSING_FIELD",
                ErrorDetail::Message(format!("Form field '{}' is required.", field)),
            ),

            AppError::MalformedUpload { message } => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_UPLOAD",
                ErrorDetail::Message(format!("Failed to parse uploaded form data: {}", message)),
            ),

            AppError::PayloadTooLarge { field, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                ErrorDetail::Message(format!(
                    "Form field '{}' exceeds the maximum upload size of {} bytes.",
                    field, limit
                )),
            ),

            AppError::InvalidArchive { .. } => (
                StatusCode::BAD_REQUEST,
                "INVALID_ARCHIVE",
                ErrorDetail::Message("Provided assets archive is not a valid ZIP file.".to_string()),
            ),

            AppError::UnsafeArchive { .. } => (
                StatusCode::BAD_REQUEST,
                "UNSAFE_ARCHIVE",
                ErrorDetail::Message("Archive contains unsafe paths.".to_string()),
            ),

            AppError::ArchiveTooLarge { .. } => (
                StatusCode::BAD_REQUEST,
                "ARCHIVE_TOO_LARGE",
                ErrorDetail::Message("Archive expands beyond the allowed size.".to_string()),
            ),

            AppError::CompilationFailed { stdout, stderr, .. } => (
                StatusCode::BAD_REQUEST,
                "COMPILATION_FAILED",
                ErrorDetail::Compilation {
                    message: "LaTeX compilation failed.".to_string(),
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                },
            ),

            AppError::EngineNotFound { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENGINE_NOT_FOUND",
                ErrorDetail::Message("LaTeX engine executable not found.".to_string()),
            ),

            AppError::PdfMissing { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PDF_MISSING",
                ErrorDetail::Message("PDF output missing after compilation.".to_string()),
            ),

            AppError::TimeoutError { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                ErrorDetail::Message("LaTeX compilation timed out.".to_string()),
            ),

            AppError::InternalError { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                ErrorDetail::Message("Unexpected error during compilation.".to_string()),
            ),
        };

        (
            status,
            ErrorResponse {
                detail,
                error_code: error_code.to_string(),
            },
        )
    }
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::InvalidMainFile { .. }
            | AppError::MissingField { .. }
            | AppError::MalformedUpload { .. }
            | AppError::PayloadTooLarge { .. }
            | AppError::InvalidArchive { .. }
            | AppError::UnsafeArchive { .. }
            | AppError::ArchiveTooLarge { .. }
            | AppError::CompilationFailed { .. } => ErrorCategory::ClientInput,
            AppError::EngineNotFound { .. } | AppError::PdfMissing { .. } => {
                ErrorCategory::Environment
            }
            AppError::TimeoutError { .. } => ErrorCategory::Timeout,
            AppError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        ErrorHandler::handle_error(self).0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.category() {
            ErrorCategory::ClientInput => tracing::info!("Rejected request: {}", self),
            ErrorCategory::Timeout => tracing::warn!("{}", self),
            ErrorCategory::Environment | ErrorCategory::Internal => {
                tracing::error!("Request failed: {}", self)
            }
        }

        let (status, body) = ErrorHandler::handle_error(&self);
        (status, Json(body)).into_response()
    }
}

// Convenience functions for creating specific errors
impl AppError {
    pub fn invalid_main_file(message: impl Into<String>) -> Self {
        AppError::InvalidMainFile { message: message.into() }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        AppError::MissingField { field: field.into() }
    }

    pub fn malformed_upload(message: impl Into<String>) -> Self {
        AppError::MalformedUpload { message: message.into() }
    }

    pub fn invalid_archive(message: impl Into<String>) -> Self {
        AppError::InvalidArchive { message: message.into() }
    }

    pub fn unsafe_archive(entry: impl Into<String>) -> Self {
        AppError::UnsafeArchive { entry: entry.into() }
    }

    pub fn engine_not_found(engine: impl Into<String>) -> Self {
        AppError::EngineNotFound { engine: engine.into() }
    }

    pub fn pdf_missing(expected: impl Into<String>) -> Self {
        AppError::PdfMissing { expected: expected.into() }
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        AppError::TimeoutError { timeout_seconds }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        AppError::InternalError { message: message.into() }
    }
}
