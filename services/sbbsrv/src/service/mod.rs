//! Bus-level services built on the transceiver

pub mod client;
pub mod clock;

pub use client::{InfoReading, SbbClient, ScanHit};
pub use clock::{ClockConfig, ClockUpdater, LocalClock, ManualClock, WallClock};
