//! Core data models for the upload ledger and its audit trail.
//!
//! These entities map to database tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod audit_log;
pub mod uploaded_file;
