//! src/services/upload_service.rs
//!
//! UploadService: receives a payload into the BlobStore and records it in
//! the `files` ledger inside one SQLite transaction. The transaction first
//! publishes the request context (requester IP, database user) so the audit
//! triggers on `files` can capture it. Any failure after the blob was written
//! rolls the transaction back and deletes the blob again.

use crate::{
    models::uploaded_file::UploadedFile,
    services::blob_store::{BlobStore, StoredBlob},
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use sqlx::{SqliteConnection, SqlitePool};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file was attached to the request")]
    NoFile,
    #[error("more than one file was attached to the request")]
    MultipleFiles,
    #[error("could not persist the upload record: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("could not write the uploaded file: {0}")]
    Filesystem(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Orchestrates blob writes and ledger inserts.
#[derive(Clone)]
pub struct UploadService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    /// Where payloads are written.
    pub blobs: BlobStore,

    /// Recorded as the acting database user by the audit triggers.
    db_user: String,
}

impl UploadService {
    pub fn new(db: Arc<SqlitePool>, blobs: BlobStore, db_user: impl Into<String>) -> Self {
        Self {
            db,
            blobs,
            db_user: db_user.into(),
        }
    }

    /// Write the payload to disk. Nothing is recorded yet.
    pub async fn receive<S, E>(&self, original_name: &str, stream: S) -> UploadResult<StoredBlob>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        self.blobs
            .write_stream(original_name, stream)
            .await
            .map_err(|err| {
                error!(original_name, error = %err, "failed to write upload to disk");
                UploadError::Filesystem(err)
            })
    }

    /// Record a received blob in the ledger.
    ///
    /// On failure the blob is removed; cleanup errors are logged and never
    /// replace the original error.
    pub async fn commit(&self, blob: StoredBlob, requester_ip: &str) -> UploadResult<UploadedFile> {
        match self.record(&blob, requester_ip).await {
            Ok(file) => {
                info!(
                    stored_name = %file.stored_name,
                    size_bytes = file.size_bytes,
                    requester_ip,
                    "upload recorded"
                );
                Ok(file)
            }
            Err(err) => {
                error!(stored_name = %blob.stored_name, error = %err, "upload transaction failed");
                self.discard(&blob).await;
                Err(err)
            }
        }
    }

    /// Best-effort removal of a blob that will not be recorded.
    pub async fn discard(&self, blob: &StoredBlob) {
        if let Err(err) = self.blobs.remove(blob).await {
            error!(path = %blob.path.display(), error = %err, "failed to clean up uploaded file");
        }
    }

    /// Run the ledger transaction. The connection goes back to the pool
    /// when the transaction is committed, rolled back or dropped.
    async fn record(&self, blob: &StoredBlob, requester_ip: &str) -> UploadResult<UploadedFile> {
        let mut tx = self.db.begin().await?;

        match insert_with_context(&mut *tx, blob, requester_ip, &self.db_user).await {
            Ok(file) => {
                tx.commit().await?;
                Ok(file)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(err.into())
            }
        }
    }
}

/// Set the audit context, insert the ledger row, then clear the context.
/// All three statements run on the transaction's connection.
async fn insert_with_context(
    conn: &mut SqliteConnection,
    blob: &StoredBlob,
    requester_ip: &str,
    db_user: &str,
) -> Result<UploadedFile, sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_context (id, requester_ip, usuario_db) VALUES (1, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            requester_ip = excluded.requester_ip,
            usuario_db = excluded.usuario_db",
    )
    .bind(requester_ip)
    .bind(db_user)
    .execute(&mut *conn)
    .await?;

    let file = sqlx::query_as::<_, UploadedFile>(
        r#"
        INSERT INTO files (filename, originalname, size_bytes, upload_time)
        VALUES (?, ?, ?, ?)
        RETURNING id, filename, originalname, size_bytes, upload_time
        "#,
    )
    .bind(&blob.stored_name)
    .bind(&blob.original_name)
    .bind(blob.size_bytes)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM audit_context WHERE id = 1")
        .execute(&mut *conn)
        .await?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        errors::{AppError, UPLOAD_FAILED_MESSAGE},
    };
    use axum::http::StatusCode;
    use futures::stream;

    async fn service(dir: &std::path::Path) -> UploadService {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        UploadService::new(Arc::new(pool), BlobStore::new(dir), "tester")
    }

    fn body(bytes: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(bytes))])
    }

    #[tokio::test]
    async fn commit_records_row_and_audit_context() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let blob = svc.receive("notes.txt", body(b"abc")).await.unwrap();
        let file = svc.commit(blob.clone(), "203.0.113.9").await.unwrap();

        assert_eq!(file.stored_name, blob.stored_name);
        assert_eq!(file.original_name, "notes.txt");
        assert_eq!(file.size_bytes, 3);
        assert!(blob.path.exists());

        let (ip, user): (String, String) = sqlx::query_as(
            "SELECT requester_ip, usuario_db FROM auditoria_arquivos_log WHERE operacao_tipo = 'INSERT'",
        )
        .fetch_one(&*svc.db)
        .await
        .unwrap();
        assert_eq!(ip, "203.0.113.9");
        assert_eq!(user, "tester");

        let leftover: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_context")
            .fetch_one(&*svc.db)
            .await
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_and_removes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        sqlx::query(
            "CREATE TRIGGER reject_files BEFORE INSERT ON files
             BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END",
        )
        .execute(&*svc.db)
        .await
        .unwrap();

        let blob = svc.receive("doomed.txt", body(b"data")).await.unwrap();
        assert!(blob.path.exists());

        let err = svc.commit(blob.clone(), "198.51.100.1").await.unwrap_err();
        assert!(matches!(err, UploadError::Persistence(_)));
        assert!(!blob.path.exists());

        for table in ["files", "auditoria_arquivos_log", "audit_context"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&*svc.db)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} should be empty", table);
        }
    }

    #[tokio::test]
    async fn cleanup_failure_keeps_the_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        sqlx::query(
            "CREATE TRIGGER reject_files BEFORE INSERT ON files
             BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END",
        )
        .execute(&*svc.db)
        .await
        .unwrap();

        let mut blob = svc.receive("stuck.txt", body(b"data")).await.unwrap();
        // A non-empty directory cannot be removed with `remove_file`.
        let stuck = dir.path().join("stuck");
        std::fs::create_dir(&stuck).unwrap();
        std::fs::write(stuck.join("inner"), b"x").unwrap();
        blob.path = stuck.clone();

        let err = svc.commit(blob, "198.51.100.2").await.unwrap_err();
        assert!(matches!(err, UploadError::Persistence(_)));
        assert!(stuck.join("inner").exists());

        let response = AppError::from(err);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.message, UPLOAD_FAILED_MESSAGE);

        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*svc.db)
            .await
            .unwrap();
        assert_eq!(files, 0);
    }
}
