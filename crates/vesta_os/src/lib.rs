#![forbid(unsafe_code)]

pub mod audit_reconciler;
pub mod command_bridge;
pub mod daemon_endpoint;
pub mod desktop_bridge;
pub mod event_router;
pub mod transport;
