//! Transport Layer Module
//!
//! Separates the physical bus connection from the transceiver timing logic.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Transceiver (half-duplex FSM)        │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │          Transport Interface (Trait)        │
//! │  send(), receive(), send_break(), set_rts() │
//! └─────────────────────────────────────────────┘
//!         │               │               │
//!         ▼               ▼               ▼
//!   ┌──────────┐    ┌──────────┐    ┌────────────┐
//!   │  Serial  │    │   TCP    │    │ Simulation │
//!   └──────────┘    └──────────┘    └────────────┘
//! ```
//!
//! GPIO outputs for transmitter direction live here too, because they are
//! driven alongside the transport on every frame.

pub mod factory;
pub mod gpio;
pub mod serial;
pub mod simulation;
pub mod tcp;
pub mod traits;

pub use factory::{ConnectionSpec, TransportType};
pub use gpio::{DigitalOutput, RecordingOutput, SysfsGpio};
pub use serial::{SerialTransport, SerialTransportConfig};
pub use simulation::{BusEvent, SimulatedTransport, SimulationHandle};
pub use tcp::{TcpTransport, TcpTransportConfig, DEFAULT_TCP_PORT};
pub use traits::{ConnectionState, Transport, TransportError, TransportStats};
