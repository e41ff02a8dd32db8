#![forbid(unsafe_code)]

pub mod bridge_cli;
