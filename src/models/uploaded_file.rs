//! Represents one completed upload recorded in the `files` ledger table.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A ledger row for an uploaded file.
///
/// The struct stores metadata only; the bytes live on disk under
/// `stored_name`, which is also the join key between blob and row.
#[derive(Clone, FromRow, Debug)]
pub struct UploadedFile {
    /// Auto-increment row id.
    pub id: i64,

    /// Unique name of the blob on disk (`<millis>-<original name>`).
    #[sqlx(rename = "filename")]
    pub stored_name: String,

    /// File name as sent by the client.
    #[sqlx(rename = "originalname")]
    pub original_name: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// When the upload transaction recorded this row.
    #[sqlx(rename = "upload_time")]
    pub uploaded_at: DateTime<Utc>,
}
