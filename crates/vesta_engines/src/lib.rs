#![forbid(unsafe_code)]

pub mod audit_merge;
pub mod frame;
pub mod role_authority;
pub mod secret;
