//! Service configuration
//!
//! Layered with figment: built-in defaults, then the YAML file, then
//! `SBBSRV_` environment variables (nested keys separated by `__`).
//! Command-line overrides are applied on top by the bootstrap code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rs485::TxEnableMode;
use super::transceiver::ExchangeTiming;
use super::transport::ConnectionSpec;
use crate::error::{Result, SbbError};
use crate::service::ClockConfig;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/sbbsrv.yaml";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "SBBSRV_";

/// Transmitter direction control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rs485Config {
    #[serde(default)]
    pub tx_enable: TxEnableMode,
    /// Hold time after the last byte before the transmitter is released
    #[serde(default)]
    pub tx_off_delay_ms: u64,
}

impl Default for Rs485Config {
    fn default() -> Self {
        Self {
            tx_enable: TxEnableMode::None,
            tx_off_delay_ms: 0,
        }
    }
}

impl Rs485Config {
    pub fn hold_delay(&self) -> Duration {
        Duration::from_millis(self.tx_off_delay_ms)
    }
}

/// Exchange timing defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_initiation_delay_ms")]
    pub initiation_delay_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Per-address answer timeout used by address sweeps
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

fn default_initiation_delay_ms() -> u64 {
    200
}

fn default_response_timeout_ms() -> u64 {
    2000
}

fn default_scan_timeout_ms() -> u64 {
    300
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initiation_delay_ms: default_initiation_delay_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn exchange_timing(&self) -> ExchangeTiming {
        ExchangeTiming {
            initiation_delay: Duration::from_millis(self.initiation_delay_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }
}

/// JSON API listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// TCP port; no API server is started when unset
    #[serde(default)]
    pub port: Option<u16>,
    /// Listen on all interfaces instead of loopback only
    #[serde(default)]
    pub nonlocal: bool,
}

impl ApiConfig {
    pub fn bind_host(&self) -> &'static str {
        if self.nonlocal {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: true,
            ansi: true,
            dir: None,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// `/dev/...`, `host[:port]` or `simulation`
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub rs485: Rs485Config,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Assemble the figment for `path` (or the default file)
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load defaults, file and environment
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(SbbError::config(format!(
                    "Configuration file not found: {}",
                    p.display()
                )));
            }
        }
        let config: AppConfig = Self::figment(path).extract()?;
        debug!("Configuration loaded: {config:?}");
        Ok(config)
    }

    /// Parsed connection target
    pub fn connection_spec(&self) -> Result<ConnectionSpec> {
        let spec = self
            .connection
            .as_deref()
            .ok_or_else(|| SbbError::config("No RS485 connection specified"))?;
        Ok(spec.parse()?)
    }

    pub fn validate(&self) -> Result<()> {
        self.connection_spec()?;

        if self.timing.response_timeout_ms == 0 {
            return Err(SbbError::config("timing.response_timeout_ms must be > 0"));
        }
        if self.timing.scan_timeout_ms == 0 {
            return Err(SbbError::config("timing.scan_timeout_ms must be > 0"));
        }
        if self.api.port == Some(0) {
            return Err(SbbError::config("api.port cannot be 0"));
        }
        if let TxEnableMode::Gpio { tx_pin, rx_pin } = self.rs485.tx_enable {
            if tx_pin == rx_pin {
                return Err(SbbError::config(
                    "TX and RX enable must use different GPIO pins",
                ));
            }
        }
        self.clock.validate()?;
        Ok(())
    }
}
