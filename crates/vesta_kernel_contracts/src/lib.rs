#![forbid(unsafe_code)]

pub mod actor;
pub mod audit;
pub mod bridge;
pub mod common;
pub mod event;
pub mod role;
pub mod status;

pub use common::{
    ChannelState, ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate,
};
