use std::error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Daemon configuration, loaded from a YAML file at startup. Every section
/// except the socket bindings has usable defaults. A config that does not
/// parse is fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bindings: Bindings,
    #[serde(default)]
    pub zmq: ZmqConfig,
    #[serde(default)]
    pub downtime_detection: DowntimeConfig,
    #[serde(default)]
    pub garbage_collection: GcConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub persistence: Option<PersistenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bindings {
    /// Upstream feed endpoint the subscriber connects to.
    pub dvs_server: String,
    /// Request/reply endpoint for client queries.
    pub client_server: String,
    /// Request/reply endpoint for train injection.
    pub injector_server: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZmqConfig {
    /// Optional envelope string filtering the upstream subscription;
    /// unset subscribes to everything.
    #[serde(default)]
    pub envelope: Option<String>,
}

/// Downtime detection over a sliding window of per-minute message counts.
#[derive(Debug, Clone, Deserialize)]
pub struct DowntimeConfig {
    /// Window length in minutes.
    #[serde(default = "default_count_time_window")]
    pub count_time_window: usize,
    /// Minimum messages per window to count as healthy.
    #[serde(default = "default_count_threshold")]
    pub count_threshold: u64,
    /// Minutes of sustained traffic before RECOVERING becomes UP.
    #[serde(default = "default_recovery_time")]
    pub recovery_time: i64,
}

fn default_count_time_window() -> usize {
    10
}

fn default_count_threshold() -> u64 {
    1
}

fn default_recovery_time() -> i64 {
    70
}

impl Default for DowntimeConfig {
    fn default() -> Self {
        Self {
            count_time_window: default_count_time_window(),
            count_threshold: default_count_threshold(),
            recovery_time: default_recovery_time(),
        }
    }
}

/// Lifecycle thresholds, all in minutes.
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// How long after the current departure a feed train that never
    /// reported status 5 counts as departed anyway.
    #[serde(default = "default_gc_threshold")]
    pub gc_threshold: i64,
    /// The same for injected trains; zero marks them the moment their
    /// departure time passes.
    #[serde(default = "default_gc_threshold_static")]
    pub gc_threshold_static: i64,
    /// How long a departed train remains queryable before eviction.
    #[serde(default = "default_gc_threshold_departed")]
    pub gc_threshold_departed: i64,
}

fn default_gc_threshold() -> i64 {
    10
}

fn default_gc_threshold_static() -> i64 {
    0
}

fn default_gc_threshold_departed() -> i64 {
    120
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            gc_threshold: default_gc_threshold(),
            gc_threshold_static: default_gc_threshold_static(),
            gc_threshold_departed: default_gc_threshold_departed(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Keep departed trains instead of evicting them. Debugging aid.
    #[serde(default)]
    pub keep_departures: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the station.store / trein.store snapshot files.
    pub directory: PathBuf,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(why) => write!(f, "cannot read config file: {}", why),
            ConfigError::Yaml(why) => write!(f, "invalid config file: {}", why),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(why: std::io::Error) -> Self {
        ConfigError::Io(why)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(why: serde_yaml::Error) -> Self {
        ConfigError::Yaml(why)
    }
}
