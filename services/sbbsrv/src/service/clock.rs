//! Wall clock display updater
//!
//! Drives hour, minute and weekday modules from local time. A cycle runs at
//! start and then at every minute boundary.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::SbbClient;
use crate::error::{Result, SbbError};
use crate::protocol::ModuleType;

/// Source of local time
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// System local time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

fn default_weekday_names() -> Vec<String> {
    ["SO", "MO", "DI", "MI", "DO", "FR", "SA"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Module addresses of the clock display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default)]
    pub hour_module: Option<u8>,
    #[serde(default)]
    pub minute_module: Option<u8>,
    /// Module showing the first weekday letter
    #[serde(default)]
    pub weekday_module1: Option<u8>,
    /// Module showing the second weekday letter
    #[serde(default)]
    pub weekday_module2: Option<u8>,
    /// Abbreviations, Sunday first
    #[serde(default = "default_weekday_names")]
    pub weekday_names: Vec<String>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            hour_module: None,
            minute_module: None,
            weekday_module1: None,
            weekday_module2: None,
            weekday_names: default_weekday_names(),
        }
    }
}

impl ClockConfig {
    /// True when at least one module is assigned
    pub fn is_enabled(&self) -> bool {
        self.hour_module.is_some()
            || self.minute_module.is_some()
            || self.weekday_module1.is_some()
            || self.weekday_module2.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.weekday_names.len() != 7 {
            return Err(SbbError::config(format!(
                "weekday_names needs 7 entries (Sunday first), got {}",
                self.weekday_names.len()
            )));
        }
        if let Some(name) = self.weekday_names.iter().find(|n| n.chars().count() < 2) {
            return Err(SbbError::config(format!(
                "Weekday abbreviation '{name}' needs two letters"
            )));
        }
        Ok(())
    }

    /// Module updates for one point in time, in send order
    pub fn updates_for(&self, now: NaiveDateTime) -> Vec<(u8, ModuleType, i64)> {
        let mut updates = Vec::new();

        if let Some(addr) = self.hour_module {
            updates.push((addr, ModuleType::Hour, i64::from(now.hour())));
        }
        if let Some(addr) = self.minute_module {
            updates.push((addr, ModuleType::Minute, i64::from(now.minute())));
        }

        let day = now.weekday().num_days_from_sunday() as usize;
        let mut letters = self
            .weekday_names
            .get(day)
            .map(|name| name.to_uppercase().chars().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();
        let first = letters.next();
        let second = letters.next();

        for (module, letter) in [(self.weekday_module1, first), (self.weekday_module2, second)] {
            if let (Some(addr), Some(letter)) = (module, letter) {
                updates.push((addr, ModuleType::Alphanumeric, i64::from(u32::from(letter))));
            }
        }

        updates
    }
}

/// Seconds until the next full minute
fn until_next_minute(now: NaiveDateTime) -> Duration {
    Duration::from_secs(u64::from(60u32.saturating_sub(now.second()).max(1)))
}

/// Periodic clock display task
#[derive(Debug)]
pub struct ClockUpdater<C: WallClock> {
    client: SbbClient,
    config: ClockConfig,
    clock: C,
}

impl<C: WallClock> ClockUpdater<C> {
    pub fn new(client: SbbClient, config: ClockConfig, clock: C) -> Self {
        Self {
            client,
            config,
            clock,
        }
    }

    /// Queue one round of updates; returns the delay until the next round
    pub fn run_cycle(&self) -> Duration {
        let now = self.clock.now();
        debug!("Clock cycle at {now}");
        for (addr, module_type, value) in self.config.updates_for(now) {
            if let Err(e) = self.client.post_module_value(addr, module_type, value) {
                warn!("Failed to queue clock update for module {addr}: {e}");
            }
        }
        until_next_minute(now)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("Clock display updater started");
        loop {
            let wait = self.run_cycle();
            tokio::select! {
                () = tokio::time::sleep(wait) => {},
                () = shutdown.cancelled() => break,
            }
        }
        info!("Clock display updater stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
