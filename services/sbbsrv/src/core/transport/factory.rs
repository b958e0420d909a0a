//! Transport Factory
//!
//! Turns a connection specification string into a transport:
//! a device path selects a serial port, `simulation` selects the in-memory
//! bus, anything else is read as `host[:port]` of a serial server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::serial::{SerialTransport, SerialTransportConfig};
use super::simulation::SimulatedTransport;
use super::tcp::{TcpTransport, TcpTransportConfig, DEFAULT_TCP_PORT};
use super::traits::{Transport, TransportError};

/// Connection target keyword for the in-memory bus
pub const SIMULATION_SPEC: &str = "simulation";

/// Supported transport types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Serial,
    Tcp,
    Simulation,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Serial => write!(f, "serial"),
            TransportType::Tcp => write!(f, "tcp"),
            TransportType::Simulation => write!(f, "simulation"),
        }
    }
}

/// Parsed connection specification
#[derive(Debug, Clone)]
pub enum ConnectionSpec {
    Serial(SerialTransportConfig),
    Tcp(TcpTransportConfig),
    Simulation,
}

impl ConnectionSpec {
    pub fn transport_type(&self) -> TransportType {
        match self {
            ConnectionSpec::Serial(_) => TransportType::Serial,
            ConnectionSpec::Tcp(_) => TransportType::Tcp,
            ConnectionSpec::Simulation => TransportType::Simulation,
        }
    }

    /// Instantiate the transport; nothing is opened yet
    pub fn create_transport(&self) -> Result<Box<dyn Transport>, TransportError> {
        let transport: Box<dyn Transport> = match self {
            ConnectionSpec::Serial(config) => Box::new(SerialTransport::new(config.clone())?),
            ConnectionSpec::Tcp(config) => Box::new(TcpTransport::new(config.clone())?),
            ConnectionSpec::Simulation => Box::new(SimulatedTransport::new()),
        };
        info!(
            "Created {} transport: {}",
            self.transport_type(),
            transport.name()
        );
        Ok(transport)
    }
}

impl FromStr for ConnectionSpec {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(TransportError::ConfigError(
                "Connection specification cannot be empty".to_string(),
            ));
        }

        if spec.eq_ignore_ascii_case(SIMULATION_SPEC) {
            Ok(ConnectionSpec::Simulation)
        } else if spec.starts_with('/') {
            let config = SerialTransportConfig::for_port(spec);
            config.validate()?;
            Ok(ConnectionSpec::Serial(config))
        } else {
            Ok(ConnectionSpec::Tcp(TcpTransportConfig::parse(
                spec,
                DEFAULT_TCP_PORT,
            )?))
        }
    }
}
