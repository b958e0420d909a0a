//! Core components: transport, direction control, transceiver, configuration

pub mod bootstrap;
pub mod config;
pub mod rs485;
pub mod transceiver;
pub mod transport;

pub use config::AppConfig;
pub use rs485::{DirectionDriver, TxEnableLine, TxEnableMode};
pub use transceiver::{
    ExchangeTiming, Transceiver, TransceiverHandle, TransceiverStatus, MAX_ANSWER_BYTES,
};
