//! Defines the HTTP surface.
//!
//! ## Structure
//! - **API** (under `/api`)
//!   - `POST /api/upload`: multipart upload of one `file` part
//!   - `GET  /api/relatorio-auditoria/arquivos`: filtered audit report
//!   - anything else under `/api`: `404` plain text
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`
//!
//! - **Frontend**: every other path is served from the public directory,
//!   falling back to `index.html` so client-side routes resolve.

use crate::{
    config::AppConfig,
    errors::AppError,
    handlers::{
        audit_handlers::audit_report,
        health_handlers::{healthz, readyz},
        upload_handlers::upload_file,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Build the router for all routes, still waiting for its `AppState`.
pub fn routes(cfg: &AppConfig) -> Router<AppState> {
    let api = Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(cfg.max_upload_bytes)),
        )
        .route("/relatorio-auditoria/arquivos", get(audit_report))
        .fallback(api_not_found);

    let index = cfg.public_dir.join("index.html");
    let frontend = ServeDir::new(&cfg.public_dir).fallback(ServeFile::new(index));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api", api)
        .fallback_service(frontend)
}

/// The complete application: routes, request tracing and shared state.
pub fn app(cfg: &AppConfig, state: AppState) -> Router {
    routes(cfg)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_not_found() -> AppError {
    AppError::not_found("API endpoint not found")
}
