pub mod audit_service;
pub mod blob_store;
pub mod upload_service;
