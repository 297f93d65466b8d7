use crate::services::{audit_service::AuditQueryError, upload_service::UploadError};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to save or audit the file.";
pub const NO_FILE_MESSAGE: &str = "No file uploaded.";
pub const REPORT_FAILED_MESSAGE: &str = "Failed to generate audit report.";

/// The single terminal error response of a handler.
///
/// Rendered as plain text; internal details are logged, never returned.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NoFile => AppError::bad_request(NO_FILE_MESSAGE),
            UploadError::MultipleFiles => {
                AppError::bad_request("Only one file may be uploaded per request.")
            }
            // Multipart stream errors keep the extractor's status (400/413).
            UploadError::Filesystem(io_err) => match io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
            {
                Some(multipart) => AppError::new(multipart.status(), multipart.body_text()),
                None => AppError::internal(UPLOAD_FAILED_MESSAGE),
            },
            UploadError::Persistence(_) => AppError::internal(UPLOAD_FAILED_MESSAGE),
        }
    }
}

impl From<AuditQueryError> for AppError {
    fn from(err: AuditQueryError) -> Self {
        match err {
            AuditQueryError::InvalidDate { .. } | AuditQueryError::InvalidOperation(_) => {
                AppError::bad_request(err.to_string())
            }
            AuditQueryError::Query(_) => AppError::internal(REPORT_FAILED_MESSAGE),
        }
    }
}
