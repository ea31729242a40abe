//! Bootstrap configuration for radio-alarm
//!
//! Service settings that are fixed for the lifetime of the process. The
//! alarm/radio state itself lives in the persisted document (`store`).
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (via clap `env`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::player::{CommandLauncher, DEFAULT_STREAM_URL};
use crate::scheduler::SchedulerSettings;

/// Top-level TOML document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// HTTP server port
    pub port: u16,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Persisted alarm/radio document, relative to the working directory
    /// unless absolute
    pub state_file: PathBuf,

    /// Only sound the alarm Monday to Friday
    pub weekdays_only: bool,

    /// Alarm check interval
    pub poll_interval_ms: u64,

    pub player: PlayerConfig,

    pub logging: LoggingConfig,
}

/// External player command line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Time between the terminate signal and the forced kill
    pub grace_period_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset
    pub level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: "0.0.0.0".to_string(),
            state_file: PathBuf::from("radio-config.json"),
            weekdays_only: true,
            poll_interval_ms: 1000,
            player: PlayerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: "mplayer".to_string(),
            args: vec![DEFAULT_STREAM_URL.to_string()],
            grace_period_ms: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind_addr: Option<String>,
    pub state_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ServiceConfig {
    /// Parse a TOML document; absent fields keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// `~/.config/radio-alarm/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("radio-alarm").join("config.toml"))
    }

    /// File `resolve` reads: the explicit path, else the default path if it
    /// exists, else none
    pub fn source(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| Self::default_path().filter(|path| path.exists()))
    }

    /// Load from `source`, or built-in defaults when there is none
    ///
    /// An explicit path must exist; a missing default file is not an error.
    /// Runs before logging is set up, so it logs nothing itself.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match Self::source(explicit) {
            Some(path) => Self::load_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line/environment values on top of the file
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(bind_addr) = overrides.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(state_file) = overrides.state_file {
            self.state_file = state_file;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.player.grace_period_ms)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            // A zero period would make tokio::time::interval panic
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            weekdays_only: self.weekdays_only,
        }
    }

    pub fn launcher(&self) -> CommandLauncher {
        CommandLauncher::new(self.player.program.clone(), self.player.args.clone())
    }
}
