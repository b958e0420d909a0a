//! RS485 transmitter direction control
//!
//! Only one side may drive the half-duplex bus. Before a frame goes out the
//! transmitter is enabled; after the last byte it is released again once the
//! hold delay has passed. Releases are debounced: a new release replaces a
//! pending one, and an enable while one is pending cancels it, so
//! back-to-back frames keep the line asserted.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::transport::{DigitalOutput, SysfsGpio, Transport, TransportError};

/// How the transmitter enable is signalled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum TxEnableMode {
    /// Adapter switches direction on its own
    #[default]
    None,
    /// DTR modem line
    Dtr,
    /// RTS modem line
    Rts,
    /// Separate TX-enable and RX-enable GPIO pins
    Gpio { tx_pin: u32, rx_pin: u32 },
}

impl fmt::Display for TxEnableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxEnableMode::None => write!(f, "none"),
            TxEnableMode::Dtr => write!(f, "dtr"),
            TxEnableMode::Rts => write!(f, "rts"),
            TxEnableMode::Gpio { tx_pin, rx_pin } => write!(f, "gpio:{tx_pin},{rx_pin}"),
        }
    }
}

impl FromStr for TxEnableMode {
    type Err = String;

    /// Accepts `none`, `dtr`, `rts` or `gpio:TX,RX`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "none" => return Ok(TxEnableMode::None),
            "dtr" => return Ok(TxEnableMode::Dtr),
            "rts" => return Ok(TxEnableMode::Rts),
            _ => {},
        }

        let pins = s
            .strip_prefix("gpio:")
            .ok_or_else(|| format!("Unknown tx enable mode '{s}' (none, dtr, rts, gpio:TX,RX)"))?;
        let (tx, rx) = pins
            .split_once(',')
            .ok_or_else(|| format!("GPIO tx enable needs two pins, got '{pins}'"))?;
        let parse_pin = |p: &str| {
            p.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid GPIO pin number '{p}'"))
        };
        Ok(TxEnableMode::Gpio {
            tx_pin: parse_pin(tx)?,
            rx_pin: parse_pin(rx)?,
        })
    }
}

impl TryFrom<String> for TxEnableMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TxEnableMode> for String {
    fn from(mode: TxEnableMode) -> Self {
        mode.to_string()
    }
}

/// Concrete enable line, one variant per [`TxEnableMode`]
#[derive(Debug)]
pub enum TxEnableLine {
    None,
    Dtr,
    Rts,
    Gpio {
        tx: Box<dyn DigitalOutput>,
        rx: Box<dyn DigitalOutput>,
    },
}

impl TxEnableLine {
    /// Open the outputs `mode` needs; GPIO pins start in receive direction
    pub fn open(mode: TxEnableMode) -> Result<Self, TransportError> {
        Ok(match mode {
            TxEnableMode::None => TxEnableLine::None,
            TxEnableMode::Dtr => TxEnableLine::Dtr,
            TxEnableMode::Rts => TxEnableLine::Rts,
            TxEnableMode::Gpio { tx_pin, rx_pin } => TxEnableLine::Gpio {
                tx: Box::new(SysfsGpio::open(tx_pin, false)?),
                rx: Box::new(SysfsGpio::open(rx_pin, true)?),
            },
        })
    }

    /// Drive the line to `enabled`
    pub async fn assert(
        &mut self,
        bus: &mut dyn Transport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        match self {
            TxEnableLine::None => Ok(()),
            TxEnableLine::Dtr => bus.set_dtr(enabled).await,
            TxEnableLine::Rts => bus.set_rts(enabled).await,
            TxEnableLine::Gpio { tx, rx } => {
                trace!("{} = {enabled}, {} = {}", tx.describe(), rx.describe(), !enabled);
                tx.set(enabled)?;
                rx.set(!enabled)
            },
        }
    }
}

/// Debounced transmitter enable state
#[derive(Debug)]
pub struct DirectionDriver {
    line: TxEnableLine,
    hold: Duration,
    enabled: bool,
    pending_disable: Option<Instant>,
}

impl DirectionDriver {
    pub fn new(line: TxEnableLine, hold: Duration) -> Self {
        Self {
            line,
            hold,
            enabled: false,
            pending_disable: None,
        }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// When the pending release fires, if one is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_disable
    }

    /// Drive the line inactive unconditionally
    pub async fn force_inactive(&mut self, bus: &mut dyn Transport) -> Result<(), TransportError> {
        self.reset();
        self.line.assert(bus, false).await
    }

    /// Forget the tracked line state, e.g. after the bus went away
    pub fn reset(&mut self) {
        self.pending_disable = None;
        self.enabled = false;
    }

    /// Assert the transmitter, cancelling any pending release
    pub async fn enable(&mut self, bus: &mut dyn Transport) -> Result<(), TransportError> {
        if self.pending_disable.take().is_some() {
            trace!("Pending tx release cancelled");
        }
        if !self.enabled {
            self.line.assert(bus, true).await?;
            self.enabled = true;
            debug!("Transmitter enabled");
        }
        Ok(())
    }

    /// Release the transmitter after the hold delay, immediately when zero
    pub async fn release(&mut self, bus: &mut dyn Transport) -> Result<(), TransportError> {
        if self.hold.is_zero() {
            self.pending_disable = None;
            return self.disable(bus).await;
        }
        self.pending_disable = Some(Instant::now() + self.hold);
        Ok(())
    }

    /// Carry out the pending release once its deadline has passed
    pub async fn fire_if_due(&mut self, bus: &mut dyn Transport) -> Result<(), TransportError> {
        match self.pending_disable {
            Some(deadline) if Instant::now() >= deadline => {
                self.pending_disable = None;
                self.disable(bus).await
            },
            _ => Ok(()),
        }
    }

    async fn disable(&mut self, bus: &mut dyn Transport) -> Result<(), TransportError> {
        if self.enabled {
            // Next enable asserts again even if this write fails
            self.enabled = false;
            self.line.assert(bus, false).await?;
            debug!("Transmitter released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{BusEvent, RecordingOutput, SimulatedTransport};
    use tracing_test::traced_test;

    #[test]
    fn test_parse_tx_enable_mode() {
        assert_eq!("none".parse::<TxEnableMode>().unwrap(), TxEnableMode::None);
        assert_eq!("DTR".parse::<TxEnableMode>().unwrap(), TxEnableMode::Dtr);
        assert_eq!("rts".parse::<TxEnableMode>().unwrap(), TxEnableMode::Rts);
        assert_eq!(
            "gpio:17,27".parse::<TxEnableMode>().unwrap(),
            TxEnableMode::Gpio {
                tx_pin: 17,
                rx_pin: 27
            }
        );
        assert!("gpio:17".parse::<TxEnableMode>().is_err());
        assert!("gpio:a,b".parse::<TxEnableMode>().is_err());
        assert!("cts".parse::<TxEnableMode>().is_err());

        let mode: TxEnableMode = serde_json::from_str("\"gpio:4,5\"").unwrap();
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"gpio:4,5\"");
        assert_eq!(
            TxEnableMode::Gpio {
                tx_pin: 1,
                rx_pin: 2
            }
            .to_string(),
            "gpio:1,2"
        );
    }

    #[tokio::test]
    async fn test_gpio_pair_drives_opposite_levels() {
        let tx = RecordingOutput::new("tx");
        let rx = RecordingOutput::new("rx");
        let mut line = TxEnableLine::Gpio {
            tx: Box::new(tx.clone()),
            rx: Box::new(rx.clone()),
        };
        let mut bus = SimulatedTransport::new();

        line.assert(&mut bus, true).await.unwrap();
        assert_eq!(tx.level(), Some(true));
        assert_eq!(rx.level(), Some(false));

        line.assert(&mut bus, false).await.unwrap();
        assert_eq!(tx.level(), Some(false));
        assert_eq!(rx.level(), Some(true));
    }

    #[tokio::test]
    async fn test_zero_hold_releases_immediately() {
        let (mut bus, handle) = SimulatedTransport::with_handle();
        bus.connect().await.unwrap();
        let mut driver = DirectionDriver::new(TxEnableLine::Rts, Duration::ZERO);

        driver.enable(&mut bus).await.unwrap();
        assert!(driver.is_enabled());
        driver.release(&mut bus).await.unwrap();
        assert!(!driver.is_enabled());
        assert!(driver.deadline().is_none());

        let events: Vec<BusEvent> = handle.events().into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            events,
            vec![BusEvent::Connect, BusEvent::Rts(true), BusEvent::Rts(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_debounced() {
        let (mut bus, handle) = SimulatedTransport::with_handle();
        bus.connect().await.unwrap();
        let hold = Duration::from_millis(100);
        let mut driver = DirectionDriver::new(TxEnableLine::Dtr, hold);

        driver.enable(&mut bus).await.unwrap();
        driver.release(&mut bus).await.unwrap();
        let first_deadline = driver.deadline().unwrap();

        // Not due yet
        tokio::time::advance(Duration::from_millis(60)).await;
        driver.fire_if_due(&mut bus).await.unwrap();
        assert!(driver.is_enabled());

        // Re-enable cancels, a new release pushes the deadline out
        driver.enable(&mut bus).await.unwrap();
        assert!(driver.deadline().is_none());
        driver.release(&mut bus).await.unwrap();
        let second_deadline = driver.deadline().unwrap();
        assert!(second_deadline > first_deadline);

        tokio::time::advance(Duration::from_millis(60)).await;
        driver.fire_if_due(&mut bus).await.unwrap();
        assert!(driver.is_enabled());

        tokio::time::advance(Duration::from_millis(40)).await;
        driver.fire_if_due(&mut bus).await.unwrap();
        assert!(!driver.is_enabled());

        // Asserted exactly once, released exactly once
        let events: Vec<BusEvent> = handle.events().into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            events,
            vec![BusEvent::Connect, BusEvent::Dtr(true), BusEvent::Dtr(false)]
        );
    }

    #[tokio::test]
    async fn test_failed_release_still_reasserts_on_next_enable() {
        let (mut bus, handle) = SimulatedTransport::with_handle();
        bus.connect().await.unwrap();
        let mut driver = DirectionDriver::new(TxEnableLine::Rts, Duration::ZERO);
        driver.enable(&mut bus).await.unwrap();

        bus.disconnect().await.unwrap();
        assert!(driver.release(&mut bus).await.is_err());
        assert!(!driver.is_enabled());

        bus.connect().await.unwrap();
        driver.enable(&mut bus).await.unwrap();
        assert!(driver.is_enabled());

        let rts: Vec<BusEvent> = handle
            .events()
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| matches!(e, BusEvent::Rts(_)))
            .collect();
        assert_eq!(rts, vec![BusEvent::Rts(true), BusEvent::Rts(true)]);
    }

    #[tokio::test]
    async fn test_none_line_touches_nothing() {
        let (mut bus, handle) = SimulatedTransport::with_handle();
        bus.connect().await.unwrap();
        let mut driver = DirectionDriver::new(TxEnableLine::None, Duration::ZERO);
        driver.enable(&mut bus).await.unwrap();
        driver.release(&mut bus).await.unwrap();
        driver.force_inactive(&mut bus).await.unwrap();
        assert_eq!(handle.events().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_direction_changes_are_logged() {
        let mut bus = SimulatedTransport::new();
        bus.connect().await.unwrap();
        let mut driver = DirectionDriver::new(TxEnableLine::Rts, Duration::ZERO);
        driver.enable(&mut bus).await.unwrap();
        driver.release(&mut bus).await.unwrap();
        assert!(logs_contain("Transmitter enabled"));
        assert!(logs_contain("Transmitter released"));
    }
}
