pub mod audit_handlers;
pub mod health_handlers;
pub mod requester_ip;
pub mod upload_handlers;
