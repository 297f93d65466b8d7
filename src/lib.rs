//! File upload service that keeps an audited ledger of every stored file.
//!
//! Uploads are written to a local directory and recorded in SQLite inside a
//! single transaction; triggers on the ledger table capture each mutation,
//! including the requester's IP, into `auditoria_arquivos_log`.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
