//! Serial Transport Implementation
//!
//! RS485 adapters show up as ordinary serial ports. Besides byte I/O this
//! transport exposes the break condition and the modem lines, which SBB uses
//! as frame preamble and (optionally) as transmitter enable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use super::traits::{ConnectionState, Transport, TransportError, TransportStats};

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialTransportConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// How long the line is held in break state before a frame
    pub break_duration: Duration,
    /// Write timeout for individual operations
    pub write_timeout: Duration,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 2,
            parity: "None".to_string(),
            break_duration: Duration::from_millis(2),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialTransportConfig {
    /// Default SBB framing on the given port
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::ConfigError(
                "Port path cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(TransportError::ConfigError(
                "Baud rate must be greater than zero".to_string(),
            ));
        }

        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(TransportError::ConfigError(
                "Data bits must be 5, 6, 7, or 8".to_string(),
            ));
        }

        if ![1, 2].contains(&self.stop_bits) {
            return Err(TransportError::ConfigError(
                "Stop bits must be 1 or 2".to_string(),
            ));
        }

        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(TransportError::ConfigError(
                "Parity must be None, Even, or Odd".to_string(),
            ));
        }

        if self.write_timeout.is_zero() {
            return Err(TransportError::ConfigError(
                "Write timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    config: SerialTransportConfig,
    port: Option<SerialStream>,
    stats: TransportStats,
}

impl SerialTransport {
    /// Create new serial transport with configuration
    pub fn new(config: SerialTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;

        Ok(Self {
            config,
            port: None,
            stats: TransportStats::new(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("Serial port not connected".to_string()))
    }

    fn drop_port(&mut self) {
        if self.port.take().is_some() {
            self.stats.record_disconnection();
            self.stats.connection_state = ConnectionState::Error;
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    fn name(&self) -> &str {
        &self.config.port
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        self.stats.record_connection_attempt();

        debug!("Opening serial port: {}", self.config.port);

        let result = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits())
            .parity(self.config.parity())
            .stop_bits(self.config.stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async();

        match result {
            Ok(mut port) => {
                #[cfg(unix)]
                port.set_exclusive(false).map_err(|e| {
                    TransportError::ConnectionFailed(format!("Failed to set exclusive mode: {e}"))
                })?;

                self.port = Some(port);
                self.stats.record_successful_connection();
                info!(
                    "Opened serial port {} at {} baud",
                    self.config.port, self.config.baud_rate
                );
                Ok(())
            },
            Err(e) => {
                let error_msg = format!("Failed to open serial port {}: {e}", self.config.port);
                error!("{error_msg}");
                self.stats.record_failed_connection();
                Err(TransportError::ConnectionFailed(error_msg))
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            self.stats.record_disconnection();
            info!("Closed serial port: {}", self.config.port);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let write_timeout = self.config.write_timeout;
        let port = self.port_mut()?;

        let send_operation = async {
            port.write_all(data).await?;
            port.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(write_timeout, send_operation).await {
            Ok(Ok(bytes_sent)) => {
                self.stats.record_bytes_sent(bytes_sent);
                debug!(
                    hex_data = %common::hex::format_hex_spaced(data),
                    length = bytes_sent,
                    direction = "send",
                    "[Serial Transport] Raw packet"
                );
                Ok(bytes_sent)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to send data: {e}");
                error!("{error_msg}");
                self.drop_port();
                Err(TransportError::SendFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!("Send operation timed out after {write_timeout:?}");
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
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::ReceiveFailed("Serial port not connected".to_string()))?;

        let result = match timeout_duration {
            Some(limit) => match timeout(limit, port.read(buffer)).await {
                Ok(r) => r,
                Err(_) => {
                    trace!("Receive timed out after {limit:?}");
                    return Err(TransportError::Timeout(format!(
                        "Receive operation timed out after {limit:?}"
                    )));
                },
            },
            None => port.read(buffer).await,
        };

        match result {
            Ok(0) => {
                self.drop_port();
                Err(TransportError::ConnectionLost(format!(
                    "Serial port {} closed",
                    self.config.port
                )))
            },
            Ok(bytes_read) => {
                self.stats.record_bytes_received(bytes_read);
                debug!(
                    hex_data = %common::hex::format_hex_spaced(&buffer[..bytes_read]),
                    length = bytes_read,
                    direction = "recv",
                    "[Serial Transport] Raw packet"
                );
                Ok(bytes_read)
            },
            Err(e) => {
                let error_msg = format!("Failed to receive data: {e}");
                error!("{error_msg}");
                self.drop_port();
                Err(TransportError::ReceiveFailed(error_msg))
            },
        }
    }

    async fn send_break(&mut self) -> Result<(), TransportError> {
        let hold = self.config.break_duration;
        let port = self.port_mut()?;

        port.set_break()
            .map_err(|e| TransportError::LineControl(format!("Failed to set break: {e}")))?;
        tokio::time::sleep(hold).await;
        port.clear_break()
            .map_err(|e| TransportError::LineControl(format!("Failed to clear break: {e}")))?;

        trace!("Sent break ({hold:?})");
        Ok(())
    }

    async fn set_dtr(&mut self, level: bool) -> Result<(), TransportError> {
        self.port_mut()?
            .write_data_terminal_ready(level)
            .map_err(|e| TransportError::LineControl(format!("Failed to set DTR: {e}")))?;
        trace!("DTR = {level}");
        Ok(())
    }

    async fn set_rts(&mut self, level: bool) -> Result<(), TransportError> {
        self.port_mut()?
            .write_request_to_send(level)
            .map_err(|e| TransportError::LineControl(format!("Failed to set RTS: {e}")))?;
        trace!("RTS = {level}");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn connection_state(&self) -> ConnectionState {
        self.stats.connection_state
    }

    async fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
