//! Shared building blocks for the SBB display services
//!
//! - logging setup with runtime-adjustable filters
//! - hex encoding/decoding for bus payloads

pub mod hex;
pub mod logging;

pub use logging::{LogConfig, LoggingError};
