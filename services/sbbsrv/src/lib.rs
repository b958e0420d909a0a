//! SBB Split-Flap Display Service (`sbbsrv`)
//!
//! Drives split-flap display modules on a shared RS485 bus. A single
//! transceiver task owns the bus and serializes every exchange; the clock
//! updater and the JSON API submit work to it through a cloneable handle.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ Clock Updater│   │  JSON API    │
//! └──────┬───────┘   └──────┬───────┘
//!        └────► SbbClient ◄─┘
//!                  │ (queue)
//!                  ▼
//!            ┌─────────────┐    ┌──────────────────┐
//!            │ Transceiver │───►│ Serial/TCP/Sim   │
//!            └─────────────┘    │ + TX enable line │
//!                               └──────────────────┘
//! ```

pub mod api;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;

pub use crate::core::config::AppConfig;
pub use crate::core::transceiver::{ExchangeTiming, Transceiver, TransceiverHandle};
pub use crate::error::{Result, SbbError};
pub use crate::protocol::{Frame, ModuleType};
pub use crate::service::{ClockUpdater, SbbClient};
