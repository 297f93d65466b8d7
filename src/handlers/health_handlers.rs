//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> database round-trip plus a probe file in the upload dir

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, io, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise. The body lists each check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("database", CheckStatus::from(check_database(&state.uploads.db).await));
    checks.insert(
        "upload_dir",
        CheckStatus::from(check_upload_dir(state.uploads.blobs.root()).await),
    );

    let ready = checks.values().all(|check| check.ok);
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (status, Json(ReadyResponse { status: label, checks }))
}

async fn check_database(pool: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(1) => Ok(()),
        Ok(other) => Err(format!("unexpected result: {}", other)),
        Err(err) => Err(format!("error: {}", err)),
    }
}

/// Write, read back and delete a uniquely named probe file.
async fn check_upload_dir(root: &Path) -> Result<(), String> {
    let probe = root.join(format!(".readyz-{}", Uuid::new_v4()));
    let outcome = round_trip(root, &probe).await;
    let _ = fs::remove_file(&probe).await;

    match outcome {
        Ok(bytes) if bytes == PROBE_CONTENT => Ok(()),
        Ok(_) => Err("probe content mismatch".into()),
        Err(err) => Err(format!("probe failed: {}", err)),
    }
}

async fn round_trip(root: &Path, probe: &Path) -> io::Result<Vec<u8>> {
    fs::create_dir_all(root).await?;
    fs::write(probe, PROBE_CONTENT).await?;
    fs::read(probe).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}
