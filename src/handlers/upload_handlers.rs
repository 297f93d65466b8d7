//! HTTP handler for `POST /api/upload`.
//! Streams the single `file` part to disk and delegates the ledger
//! transaction to `UploadService`.

use crate::{
    errors::AppError,
    handlers::requester_ip::RequesterIp,
    services::{
        blob_store::StoredBlob,
        upload_service::{UploadError, UploadService},
    },
    state::AppState,
};
use axum::extract::{Multipart, State};
use futures::TryStreamExt;
use std::io;

/// Multipart field that carries the upload.
pub const FILE_FIELD: &str = "file";

pub async fn upload_file(
    State(state): State<AppState>,
    RequesterIp(requester_ip): RequesterIp,
    mut multipart: Multipart,
) -> Result<String, AppError> {
    let blob = receive_single_file(&state.uploads, &mut multipart).await?;
    let file = state.uploads.commit(blob, &requester_ip).await?;

    Ok(format!(
        "Upload of file {} completed successfully and audited.",
        file.original_name
    ))
}

/// Drain the multipart body, writing exactly one `file` part to disk.
///
/// Other fields are skipped. If the body turns out to be invalid after the
/// file was written, the blob is removed before the error is returned.
async fn receive_single_file(
    service: &UploadService,
    multipart: &mut Multipart,
) -> Result<StoredBlob, AppError> {
    let mut received: Option<StoredBlob> = None;

    let outcome: Result<(), AppError> = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err.into()),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(original_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            continue;
        };
        if received.is_some() {
            break Err(UploadError::MultipleFiles.into());
        }

        let body = field.map_err(io::Error::other);
        match service.receive(&original_name, body).await {
            Ok(blob) => received = Some(blob),
            Err(err) => break Err(err.into()),
        }
    };

    match (outcome, received) {
        (Ok(()), Some(blob)) => Ok(blob),
        (Ok(()), None) => Err(UploadError::NoFile.into()),
        (Err(err), Some(blob)) => {
            service.discard(&blob).await;
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}
