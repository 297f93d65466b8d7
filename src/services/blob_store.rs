//! BlobStore: writes uploaded payloads to a flat directory on local disk.
//!
//! Blob names are `<unix millis>-<sanitized original name>`; files are always
//! created exclusively so an existing blob is never overwritten.

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_NAME_ATTEMPTS: usize = 8;
/// Leaves room for the timestamp prefix within the usual 255-byte name limit.
const MAX_BASE_NAME_LEN: usize = 200;
const FALLBACK_BASE_NAME: &str = "file";

/// A payload that has been fully written to disk but not yet recorded.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub stored_name: String,
    pub original_name: String,
    pub path: PathBuf,
    pub size_bytes: i64,
}

#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }

    /// Stream a payload to a new, uniquely named file.
    ///
    /// Creates the root directory if it is missing. A partially written file
    /// is removed before the error is returned.
    pub async fn write_stream<S, E>(&self, original_name: &str, stream: S) -> io::Result<StoredBlob>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        fs::create_dir_all(&self.root).await?;
        let (stored_name, path, mut file) = self.create_exclusive(original_name).await?;

        pin_mut!(stream);
        let mut reader = StreamReader::new(stream);
        let written = match copy_and_sync(&mut reader, &mut file).await {
            Ok(written) => written,
            Err(err) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "failed to remove partial blob");
                }
                return Err(err);
            }
        };

        debug!(stored_name = %stored_name, bytes = written, "blob written");
        Ok(StoredBlob {
            stored_name,
            original_name: original_name.to_string(),
            path,
            size_bytes: i64::try_from(written).unwrap_or(i64::MAX),
        })
    }

    /// Delete a blob. A blob that is already gone counts as removed.
    pub async fn remove(&self, blob: &StoredBlob) -> io::Result<()> {
        match fs::remove_file(&blob.path).await {
            Ok(()) => {
                debug!("removed blob {}", blob.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", blob.path.display());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Open a fresh file, adding a random discriminator when the
    /// timestamped name is already taken.
    async fn create_exclusive(&self, original_name: &str) -> io::Result<(String, PathBuf, File)> {
        let base = sanitize_file_name(original_name);
        let millis = Utc::now().timestamp_millis();
        let mut candidate = format!("{}-{}", millis, base);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.path_for(&candidate);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((candidate, path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!("blob name {} taken, retrying", candidate);
                    let tag = Uuid::new_v4().simple().to_string();
                    candidate = format!("{}-{}-{}", millis, &tag[..8], base);
                }
                Err(err) => return Err(err),
            }
        }

        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique blob name",
        ))
    }
}

async fn copy_and_sync<R>(reader: &mut R, file: &mut File) -> io::Result<u64>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let written = tokio::io::copy(reader, file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Reduce a client-supplied name to a single safe path component.
///
/// Drops any directory part, control characters and surrounding
/// whitespace, caps the length, and falls back to `file` when nothing
/// usable is left.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return FALLBACK_BASE_NAME.to_string();
    }

    let mut end = cleaned.len().min(MAX_BASE_NAME_LEN);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned[..end].to_string()
}
