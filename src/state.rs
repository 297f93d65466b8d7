//! Shared state handed to every handler through axum's `State` extractor.

use crate::{
    config::AppConfig,
    services::{audit_service::AuditService, blob_store::BlobStore, upload_service::UploadService},
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub audit: AuditService,
    /// See [`AppConfig::trust_proxy`].
    pub trust_proxy: bool,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        Self {
            uploads: UploadService::new(
                db.clone(),
                BlobStore::new(cfg.upload_dir.clone()),
                cfg.db_user.clone(),
            ),
            audit: AuditService::new(db),
            trust_proxy: cfg.trust_proxy,
        }
    }
}
