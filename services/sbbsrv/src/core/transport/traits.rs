//! Transport Layer Traits
//!
//! This module defines the byte-level interface the transceiver drives. Besides
//! plain reads and writes, an RS485 bus transport must be able to emit a break
//! condition and drive the DTR/RTS modem lines used for direction control.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Modem/control line or GPIO operation failed
    #[error("Line control failed: {0}")]
    LineControl(String),
}

/// Connection state for transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport is disconnected
    Disconnected,
    /// Transport is attempting to connect
    Connecting,
    /// Transport is connected and ready
    Connected,
    /// Transport has encountered an error
    Error,
}

/// Transport statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Number of connection attempts
    pub connection_attempts: u64,
    /// Number of successful connections
    pub successful_connections: u64,
    /// Number of failed connections
    pub failed_connections: u64,
    /// Number of disconnections
    pub disconnections: u64,
    /// Last successful connection time
    pub last_connection: Option<SystemTime>,
    /// Current connection state
    pub connection_state: ConnectionState,
}

impl TransportStats {
    /// Create new transport statistics
    pub fn new() -> Self {
        Self {
            bytes_sent: 0,
            bytes_received: 0,
            connection_attempts: 0,
            successful_connections: 0,
            failed_connections: 0,
            disconnections: 0,
            last_connection: None,
            connection_state: ConnectionState::Disconnected,
        }
    }

    /// Record a connection attempt
    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
        self.connection_state = ConnectionState::Connecting;
    }

    /// Record a successful connection
    pub fn record_successful_connection(&mut self) {
        self.successful_connections += 1;
        self.last_connection = Some(SystemTime::now());
        self.connection_state = ConnectionState::Connected;
    }

    /// Record a failed connection
    pub fn record_failed_connection(&mut self) {
        self.failed_connections += 1;
        self.connection_state = ConnectionState::Error;
    }

    /// Record a disconnection
    pub fn record_disconnection(&mut self) {
        self.disconnections += 1;
        self.connection_state = ConnectionState::Disconnected;
    }

    /// Record bytes sent
    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    /// Record bytes received
    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte transport for the SBB bus
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Get transport type identifier
    fn transport_type(&self) -> &str;

    /// Get human-readable transport name
    fn name(&self) -> &str;

    /// Open the connection; a no-op when already connected
    async fn connect(&mut self) -> std::result::Result<(), TransportError>;

    /// Close the connection
    async fn disconnect(&mut self) -> std::result::Result<(), TransportError>;

    /// Write all of `data`, returning the number of bytes accepted
    async fn send(&mut self, data: &[u8]) -> std::result::Result<usize, TransportError>;

    /// Read whatever is available into `buffer`
    ///
    /// With `timeout` set, fails with [`TransportError::Timeout`] when nothing
    /// arrives in time; with `None`, waits until bytes arrive or the
    /// connection fails. Must be cancel-safe: dropping the future loses no
    /// bytes.
    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> std::result::Result<usize, TransportError>;

    /// Emit a line break condition
    async fn send_break(&mut self) -> std::result::Result<(), TransportError>;

    /// Drive the DTR line
    async fn set_dtr(&mut self, level: bool) -> std::result::Result<(), TransportError>;

    /// Drive the RTS line
    async fn set_rts(&mut self, level: bool) -> std::result::Result<(), TransportError>;

    /// Check if transport is currently connected
    async fn is_connected(&self) -> bool;

    /// Get current connection state
    async fn connection_state(&self) -> ConnectionState;

    /// Get transport statistics
    async fn stats(&self) -> TransportStats;

    /// Close the transport and clean up resources
    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.disconnect().await
    }
}

/// Implementation of Transport trait for Box<dyn Transport>
/// This allows Box<dyn Transport> to be used where Transport trait is required
#[async_trait]
impl Transport for Box<dyn Transport> {
    fn transport_type(&self) -> &str {
        self.as_ref().transport_type()
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn connect(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().connect().await
    }

    async fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().disconnect().await
    }

    async fn send(&mut self, data: &[u8]) -> std::result::Result<usize, TransportError> {
        self.as_mut().send(data).await
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> std::result::Result<usize, TransportError> {
        self.as_mut().receive(buffer, timeout).await
    }

    async fn send_break(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().send_break().await
    }

    async fn set_dtr(&mut self, level: bool) -> std::result::Result<(), TransportError> {
        self.as_mut().set_dtr(level).await
    }

    async fn set_rts(&mut self, level: bool) -> std::result::Result<(), TransportError> {
        self.as_mut().set_rts(level).await
    }

    async fn is_connected(&self) -> bool {
        self.as_ref().is_connected().await
    }

    async fn connection_state(&self) -> ConnectionState {
        self.as_ref().connection_state().await
    }

    async fn stats(&self) -> TransportStats {
        self.as_ref().stats().await
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_stats() {
        let mut stats = TransportStats::new();
        assert_eq!(stats.connection_attempts, 0);
        assert_eq!(stats.connection_state, ConnectionState::Disconnected);

        stats.record_connection_attempt();
        assert_eq!(stats.connection_attempts, 1);
        assert_eq!(stats.connection_state, ConnectionState::Connecting);

        stats.record_successful_connection();
        assert_eq!(stats.successful_connections, 1);
        assert_eq!(stats.connection_state, ConnectionState::Connected);
        assert!(stats.last_connection.is_some());

        stats.record_bytes_sent(4);
        stats.record_bytes_received(1);
        assert_eq!(stats.bytes_sent, 4);
        assert_eq!(stats.bytes_received, 1);

        stats.record_disconnection();
        assert_eq!(stats.disconnections, 1);
        assert_eq!(stats.connection_state, ConnectionState::Disconnected);
    }

    #[test]
    fn test_transport_error() {
        let error = TransportError::ConnectionFailed("Test error".to_string());
        assert!(error.to_string().contains("Connection failed"));
        assert!(error.to_string().contains("Test error"));
    }
}
