//! TCP Transport Implementation
//!
//! Reaches the bus through a serial-to-network server. Break and modem
//! lines cannot be signalled over a plain socket, so those calls succeed
//! without effect; the server side is expected to handle line turnaround.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::traits::{ConnectionState, Transport, TransportError, TransportStats};

/// Port used when a connection specification omits one
pub const DEFAULT_TCP_PORT: u16 = 2109;

/// TCP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Remote host address
    pub host: String,
    /// Remote port number
    pub port: u16,
    /// Connection timeout
    pub timeout: Duration,
    /// TCP no-delay (Nagle algorithm)
    pub no_delay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_TCP_PORT,
            timeout: Duration::from_secs(10),
            no_delay: true,
        }
    }
}

impl TcpTransportConfig {
    /// Parse `host[:port]`, falling back to `default_port`
    pub fn parse(spec: &str, default_port: u16) -> Result<Self, TransportError> {
        let spec = spec.trim();
        let (host, port) = match spec.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port.parse::<u16>().map_err(|_| {
                    TransportError::ConfigError(format!("Invalid port in '{spec}'"))
                })?;
                (host, port)
            },
            _ => (spec, default_port),
        };

        let config = Self {
            host: host.to_string(),
            port,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::ConfigError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(TransportError::ConfigError(
                "Port cannot be zero".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(TransportError::ConfigError(
                "Timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpTransportConfig,
    name: String,
    stream: Option<TcpStream>,
    stats: TransportStats,
}

impl TcpTransport {
    /// Create new TCP transport with configuration
    pub fn new(config: TcpTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let name = config.socket_addr();

        Ok(Self {
            config,
            name,
            stream: None,
            stats: TransportStats::new(),
        })
    }

    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            self.stats.record_disconnection();
            self.stats.connection_state = ConnectionState::Error;
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn transport_type(&self) -> &str {
        "tcp"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.stats.record_connection_attempt();

        let addr = self.config.socket_addr();
        debug!("Connecting to TCP server: {addr}");

        match timeout(self.config.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if self.config.no_delay {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY on {addr}: {e}");
                    }
                }
                self.stream = Some(stream);
                self.stats.record_successful_connection();
                info!("Connected to TCP server: {addr}");
                Ok(())
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to {addr}: {e}");
                error!("{error_msg}");
                self.stats.record_failed_connection();
                Err(TransportError::ConnectionFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!(
                    "Connection to {addr} timed out after {:?}",
                    self.config.timeout
                );
                error!("{error_msg}");
                self.stats.record_failed_connection();
                Err(TransportError::ConnectionFailed(error_msg))
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            self.stats.record_disconnection();
            info!("Disconnected from TCP server: {}", self.name);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("TCP stream not connected".to_string()))?;

        let send_operation = async {
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(self.config.timeout, send_operation).await {
            Ok(Ok(bytes_sent)) => {
                self.stats.record_bytes_sent(bytes_sent);
                debug!(
                    hex_data = %common::hex::format_hex_spaced(data),
                    length = bytes_sent,
                    direction = "send",
                    "[TCP Transport] Raw packet"
                );
                Ok(bytes_sent)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to send data: {e}");
                error!("{error_msg}");
                self.drop_stream();
                Err(TransportError::SendFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!("Send operation timed out after {:?}", self.config.timeout);
                warn!("{error_msg}");
                Err(TransportError::Timeout(error_msg))
            },
        }
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout_duration: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::ReceiveFailed("TCP stream not connected".to_string()))?;

        let result = match timeout_duration {
            Some(limit) => match timeout(limit, stream.read(buffer)).await {
                Ok(r) => r,
                Err(_) => {
                    return Err(TransportError::Timeout(format!(
                        "Receive operation timed out after {limit:?}"
                    )));
                },
            },
            None => stream.read(buffer).await,
        };

        match result {
            Ok(0) => {
                warn!("TCP server {} closed the connection", self.name);
                self.drop_stream();
                Err(TransportError::ConnectionLost(format!(
                    "Connection to {} closed by peer",
                    self.name
                )))
            },
            Ok(bytes_read) => {
                self.stats.record_bytes_received(bytes_read);
                debug!(
                    hex_data = %common::hex::format_hex_spaced(&buffer[..bytes_read]),
                    length = bytes_read,
                    direction = "recv",
                    "[TCP Transport] Raw packet"
                );
                Ok(bytes_read)
            },
            Err(e) => {
                let error_msg = format!("Failed to receive data: {e}");
                error!("{error_msg}");
                self.drop_stream();
                Err(TransportError::ReceiveFailed(error_msg))
            },
        }
    }

    async fn send_break(&mut self) -> Result<(), TransportError> {
        trace!("Break not available over TCP, skipped");
        Ok(())
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        trace!("DTR = {level} ignored over TCP");
        Ok(())
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        trace!("RTS = {level} ignored over TCP");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connection_state(&self) -> ConnectionState {
        self.stats.connection_state
    }

    async fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
