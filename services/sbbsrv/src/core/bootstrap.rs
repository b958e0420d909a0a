//! Service Bootstrap and Initialization
//!
//! Command-line parsing, configuration assembly and logging setup.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use super::config::AppConfig;
use super::rs485::TxEnableMode;
use crate::error::{Result, SbbError};

/// Command-line arguments for sbbsrv
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "sbbsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "RS485 driver daemon for SBB split-flap display modules",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// RS485 interface: /dev/... device, host[:port] serial server, or "simulation"
    #[arg(long = "rs485connection")]
    pub rs485_connection: Option<String>,

    /// Port for the JSON API
    #[arg(short = 'W', long = "jsonapiport")]
    pub json_api_port: Option<u16>,

    /// Accept JSON API connections from non-local clients
    #[arg(long = "jsonapinonlocal")]
    pub json_api_nonlocal: bool,

    /// Log level (trace, debug, info, warn, error, or syslog 0-7)
    #[arg(short = 'l', long = "loglevel")]
    pub log_level: Option<String>,

    /// Transmitter enable: none, dtr, rts or gpio:TX,RX
    #[arg(long = "txenable")]
    pub tx_enable: Option<TxEnableMode>,

    /// Milliseconds to keep the transmitter enabled after the last byte
    #[arg(long = "txoffdelay")]
    pub tx_off_delay_ms: Option<u64>,

    /// Address of the hour module
    #[arg(long = "hourmodule")]
    pub hour_module: Option<u8>,

    /// Address of the minute module
    #[arg(long = "minutemodule")]
    pub minute_module: Option<u8>,

    /// Address of the module showing the first weekday letter
    #[arg(long = "weekdaymodule1")]
    pub weekday_module1: Option<u8>,

    /// Address of the module showing the second weekday letter
    #[arg(long = "weekdaymodule2")]
    pub weekday_module2: Option<u8>,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Overlay command-line values on a loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(connection) = &self.rs485_connection {
            config.connection = Some(connection.clone());
        }
        if let Some(port) = self.json_api_port {
            config.api.port = Some(port);
        }
        if self.json_api_nonlocal {
            config.api.nonlocal = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = normalize_log_level(level);
        }
        if let Some(mode) = self.tx_enable {
            config.rs485.tx_enable = mode;
        }
        if let Some(delay) = self.tx_off_delay_ms {
            config.rs485.tx_off_delay_ms = delay;
        }
        if let Some(addr) = self.hour_module {
            config.clock.hour_module = Some(addr);
        }
        if let Some(addr) = self.minute_module {
            config.clock.minute_module = Some(addr);
        }
        if let Some(addr) = self.weekday_module1 {
            config.clock.weekday_module1 = Some(addr);
        }
        if let Some(addr) = self.weekday_module2 {
            config.clock.weekday_module2 = Some(addr);
        }
    }
}

/// Map syslog-style numeric levels to filter names; other input passes through
pub fn normalize_log_level(level: &str) -> String {
    match level.trim().parse::<u8>() {
        Ok(0..=3) => "error".to_string(),
        Ok(4) => "warn".to_string(),
        Ok(5 | 6) => "info".to_string(),
        Ok(_) => "debug".to_string(),
        Err(_) => level.trim().to_ascii_lowercase(),
    }
}

/// Load, override and validate the configuration
pub fn load_configuration(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

/// Initialize logging from the assembled configuration
pub fn initialize_logging(config: &AppConfig) -> Result<()> {
    let log_config = common::LogConfig {
        service_name: "sbbsrv".to_string(),
        level: config.logging.level.clone(),
        console: config.logging.console,
        ansi: config.logging.ansi,
        log_dir: config.logging.dir.clone(),
    };
    common::logging::init_with_config(log_config)
        .map_err(|e| SbbError::config(format!("Failed to init logging: {e}")))?;
    info!("Logging initialized at level '{}'", config.logging.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_original_style_flags() {
        let args = Args::try_parse_from([
            "sbbsrv",
            "--rs485connection",
            "192.168.0.9:2109",
            "--jsonapiport",
            "8090",
            "--jsonapinonlocal",
            "--txenable",
            "rts",
            "--txoffdelay",
            "3",
            "--hourmodule",
            "5",
            "--minutemodule",
            "2",
            "--weekdaymodule1",
            "10",
            "-l",
            "7",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.connection.as_deref(), Some("192.168.0.9:2109"));
        assert_eq!(config.api.port, Some(8090));
        assert!(config.api.nonlocal);
        assert_eq!(config.rs485.tx_enable, TxEnableMode::Rts);
        assert_eq!(config.rs485.tx_off_delay_ms, 3);
        assert_eq!(config.clock.hour_module, Some(5));
        assert_eq!(config.clock.minute_module, Some(2));
        assert_eq!(config.clock.weekday_module1, Some(10));
        assert_eq!(config.clock.weekday_module2, None);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_txenable_is_rejected() {
        assert!(Args::try_parse_from(["sbbsrv", "--txenable", "gpio:1"]).is_err());
    }

    #[test]
    fn test_normalize_log_level() {
        assert_eq!(normalize_log_level("3"), "error");
        assert_eq!(normalize_log_level("4"), "warn");
        assert_eq!(normalize_log_level("5"), "info");
        assert_eq!(normalize_log_level("7"), "debug");
        assert_eq!(normalize_log_level("TRACE"), "trace");
        assert_eq!(normalize_log_level("info,sbbsrv=debug"), "info,sbbsrv=debug");
    }

    #[test]
    fn test_cli_without_config_file_keeps_defaults() {
        let args = Args::try_parse_from(["sbbsrv", "--rs485connection", "simulation"]).unwrap();
        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.api.port, None);
        assert_eq!(config.timing.initiation_delay_ms, 200);
        assert!(config.validate().is_ok());
    }
}
