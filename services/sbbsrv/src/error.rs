//! Error handling for the SBB driver service
//!
//! Exchange outcomes distinguish a caller mistake (bad frame), an unavailable
//! bus (connection) and a silent module (response timeout), so callers can
//! decide on their own retry policy.

use std::time::Duration;

use thiserror::Error;

use crate::core::transport::TransportError;
use crate::protocol::FrameBuildError;

/// SBB service error type
#[derive(Error, Debug, Clone)]
pub enum SbbError {
    /// Frame could not be assembled from the request
    #[error("Frame build error: {0}")]
    FrameBuild(#[from] FrameBuildError),

    /// Transport could not be established or dropped mid-exchange
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Expected answer bytes did not arrive in time
    #[error("Response timeout: received {received} of {expected} bytes within {timeout:?}")]
    ResponseTimeout {
        expected: usize,
        received: usize,
        timeout: Duration,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation errors (invalid request parameters)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal errors (transceiver gone, runtime failures)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the SBB service
pub type Result<T> = std::result::Result<T, SbbError>;

impl SbbError {
    pub fn connection(msg: impl Into<String>) -> Self {
        SbbError::ConnectionError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SbbError::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SbbError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SbbError::InternalError(msg.into())
    }

    /// True for the "module did not answer" outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, SbbError::ResponseTimeout { .. })
    }

    /// True when the bus itself was unavailable
    pub fn is_connection(&self) -> bool {
        matches!(self, SbbError::ConnectionError(_))
    }
}

impl From<TransportError> for SbbError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConfigError(msg) => SbbError::ConfigError(msg),
            other => SbbError::ConnectionError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SbbError {
    fn from(err: std::io::Error) -> Self {
        SbbError::ConnectionError(err.to_string())
    }
}

impl From<figment::Error> for SbbError {
    fn from(err: figment::Error) -> Self {
        SbbError::ConfigError(err.to_string())
    }
}

impl From<common::hex::HexError> for SbbError {
    fn from(err: common::hex::HexError) -> Self {
        SbbError::ValidationError(err.to_string())
    }
}
