//! HTTP API modules.

pub mod generate;
