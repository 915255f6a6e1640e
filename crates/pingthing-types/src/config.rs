use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{PingError, Result};

pub const DEFAULT_TARGET: &str = "8.8.8.8";
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_HISTORY_SIZE: usize = 24;
pub const DEFAULT_BAR_WIDTH: u16 = 2;
pub const MAX_BAR_WIDTH: u16 = 8;

pub const MIN_PERIOD_SECS: f64 = 0.1;
pub const MAX_PERIOD_SECS: f64 = 60.0;
pub const MIN_HISTORY_SIZE: usize = 16;
pub const MAX_HISTORY_SIZE: usize = 64;

/// Immutable parameters of one probing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub target: String,
    pub interval_secs: f64,
    pub timeout_secs: f64,
    pub history_size: usize,
}

impl SessionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Preferences::default().session_config()
    }
}

/// User-editable preference keys. Values are corrected, never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub target: String,
    pub interval_seconds: f64,
    pub timeout_seconds: f64,
    pub history_size: usize,
    pub bar_width: u16,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.into(),
            interval_seconds: DEFAULT_INTERVAL_SECS,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            history_size: DEFAULT_HISTORY_SIZE,
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

impl Preferences {
    pub fn session_config(&self) -> SessionConfig {
        let target = self.target.trim();
        SessionConfig {
            target: if target.is_empty() {
                DEFAULT_TARGET.into()
            } else {
                target.into()
            },
            interval_secs: clamp_period(self.interval_seconds, DEFAULT_INTERVAL_SECS),
            timeout_secs: clamp_period(self.timeout_seconds, DEFAULT_TIMEOUT_SECS),
            history_size: clamp_history_size(self.history_size),
        }
    }

    pub fn bar_width(&self) -> u16 {
        self.bar_width.clamp(1, MAX_BAR_WIDTH)
    }
}

fn clamp_period(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_PERIOD_SECS, MAX_PERIOD_SECS)
    } else {
        default
    }
}

pub fn clamp_history_size(size: usize) -> usize {
    size.clamp(MIN_HISTORY_SIZE, MAX_HISTORY_SIZE)
}

/// Read-only source of preferences consulted at configure time.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences>;
}

impl PreferenceStore for Preferences {
    fn load(&self) -> Result<Preferences> {
        Ok(self.clone())
    }
}

/// Reads the `[preferences]` table of a TOML settings file.
#[derive(Debug, Clone)]
pub struct TomlPreferenceStore {
    path: std::path::PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self) -> Result<Preferences> {
        PingThingConfig::from_file(&self.path).map(|config| config.preferences)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    /// Zero keeps every entry.
    pub max_log_entries: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            max_log_entries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub probe_addrs: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            probe_addrs: vec!["1.1.1.1:53".into(), "[2606:4700:4700::1111]:53".into()],
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub retry_delay_secs: f64,
    pub retry_on_start_failure: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 5.0,
            retry_on_start_failure: true,
        }
    }
}

impl SupervisorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PingThingConfig {
    pub preferences: Preferences,
    pub ops: OpsConfig,
    pub monitor: MonitorConfig,
    pub supervisor: SupervisorConfig,
}

impl PingThingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PingError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PingError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let delay = self.supervisor.retry_delay_secs;
        if !delay.is_finite() || delay <= 0.0 {
            return Err(PingError::Configuration(
                "supervisor.retry_delay_secs must be greater than zero".into(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(PingError::Configuration(
                "monitor.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.monitor.probe_addrs.is_empty() {
            return Err(PingError::Configuration(
                "monitor.probe_addrs must list at least one address".into(),
            ));
        }
        Ok(())
    }
}
