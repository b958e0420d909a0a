//! GPIO digital outputs
//!
//! RS485 transceivers without automatic direction control need their driver
//! and receiver enable pins toggled around every frame. Pins are driven
//! through the Linux sysfs GPIO interface.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::traits::TransportError;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A single digital output line
pub trait DigitalOutput: Send + Sync + fmt::Debug {
    fn set(&mut self, level: bool) -> Result<(), TransportError>;

    /// Human-readable pin description
    fn describe(&self) -> String;
}

/// Output pin driven through `/sys/class/gpio/gpioN/value`
#[derive(Debug)]
pub struct SysfsGpio {
    pin: u32,
    value_path: PathBuf,
    level: Option<bool>,
}

impl SysfsGpio {
    /// Export `pin` and configure it as output
    pub fn open(pin: u32, initial: bool) -> Result<Self, TransportError> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin, initial)
    }

    /// Same as [`SysfsGpio::open`] with a different sysfs root
    pub fn open_at(root: &Path, pin: u32, initial: bool) -> Result<Self, TransportError> {
        let pin_dir = root.join(format!("gpio{pin}"));

        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(|e| {
                TransportError::LineControl(format!("Failed to export GPIO {pin}: {e}"))
            })?;
            debug!("Exported GPIO {pin}");
        }

        // "high"/"low" sets direction and initial level in one write
        let direction = if initial { "high" } else { "low" };
        fs::write(pin_dir.join("direction"), direction).map_err(|e| {
            TransportError::LineControl(format!("Failed to set GPIO {pin} direction: {e}"))
        })?;

        info!("GPIO {pin} configured as output, initial level {initial}");
        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
            level: Some(initial),
        })
    }
}

impl DigitalOutput for SysfsGpio {
    fn set(&mut self, level: bool) -> Result<(), TransportError> {
        if self.level == Some(level) {
            return Ok(());
        }
        fs::write(&self.value_path, if level { "1" } else { "0" }).map_err(|e| {
            self.level = None;
            TransportError::LineControl(format!("Failed to write GPIO {}: {e}", self.pin))
        })?;
        self.level = Some(level);
        debug!("GPIO {} = {}", self.pin, level);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("gpio{}", self.pin)
    }
}

/// In-memory output that records every level it was set to
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    label: String,
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingOutput {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            levels: Arc::default(),
        }
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels
            .lock()
            .map(|levels| levels.clone())
            .unwrap_or_default()
    }

    pub fn level(&self) -> Option<bool> {
        self.levels().last().copied()
    }
}

impl DigitalOutput for RecordingOutput {
    fn set(&mut self, level: bool) -> Result<(), TransportError> {
        self.levels
            .lock()
            .map_err(|_| TransportError::LineControl(format!("{} poisoned", self.label)))?
            .push(level);
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_sysfs(pin: u32) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        let pin_dir = dir.path().join(format!("gpio{pin}"));
        fs::create_dir(&pin_dir).unwrap();
        fs::write(pin_dir.join("direction"), "in").unwrap();
        fs::write(pin_dir.join("value"), "0").unwrap();
        dir
    }

    #[test]
    fn test_sysfs_gpio_writes_direction_and_value() {
        let root = fake_sysfs(17);
        let mut gpio = SysfsGpio::open_at(root.path(), 17, false).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("gpio17/direction")).unwrap(),
            "low"
        );

        gpio.set(true).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("gpio17/value")).unwrap(),
            "1"
        );
        gpio.set(false).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("gpio17/value")).unwrap(),
            "0"
        );
        assert_eq!(gpio.describe(), "gpio17");
    }

    #[test]
    fn test_sysfs_gpio_export_failure() {
        let dir = TempDir::new().unwrap();
        // No export file and no pin directory
        let missing = dir.path().join("nonexistent");
        let err = SysfsGpio::open_at(&missing, 4, false).unwrap_err();
        assert!(matches!(err, TransportError::LineControl(_)));
    }

    #[test]
    fn test_recording_output() {
        let output = RecordingOutput::new("tx");
        let mut writer = output.clone();
        writer.set(true).unwrap();
        writer.set(false).unwrap();
        assert_eq!(output.levels(), vec![true, false]);
        assert_eq!(output.level(), Some(false));
    }
}
