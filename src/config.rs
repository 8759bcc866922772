//! Configuration loading and defaults for idle-logoutd.

use crate::tracker::Timeouts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where user activity is read from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySourceKind {
    /// One activity word per line on stdin (default).
    #[default]
    Stdin,
    /// Hyprland socket2 event stream.
    Hyprland,
}

/// How the session is ended when the grace period runs out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogoutMethod {
    /// Run `logout.command` (default).
    #[default]
    Command,
    /// Ask logind to lock the session.
    LogindLock,
    /// Ask logind to terminate the session.
    LogindTerminate,
}

/// Forced logout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogoutConfig {
    pub method: LogoutMethod,

    /// Program and arguments used by the `command` method.
    pub command: Vec<String>,

    /// Stored credential removed before the session is ended.
    pub credentials_file: Option<PathBuf>,

    /// The `command` method only locks the session, so activity after it
    /// counts as a new login (default: true).
    pub session_survives: bool,
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            method: LogoutMethod::default(),
            command: vec!["loginctl".to_string(), "lock-session".to_string()],
            credentials_file: None,
            session_survives: true,
        }
    }
}

/// Main configuration for idle-logoutd.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds without activity before the warning is shown (default: 1800).
    pub idle_threshold_seconds: u64,

    /// Seconds counted down after the warning before forced logout (default: 60).
    pub grace_period_seconds: u64,

    /// Seconds between countdown updates while warning (default: 1).
    pub tick_interval_seconds: u64,

    /// Activity input.
    pub activity_source: ActivitySourceKind,

    pub logout: LogoutConfig,

    /// Dry run mode: log the logout instead of performing it.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_threshold_seconds: 1800,
            grace_period_seconds: 60,
            tick_interval_seconds: 1,
            activity_source: ActivitySourceKind::default(),
            logout: LogoutConfig::default(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("idle-logoutd").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.idle_threshold_seconds == 0 {
            anyhow::bail!("idle_threshold_seconds must be greater than zero");
        }
        if self.tick_interval_seconds == 0 {
            anyhow::bail!("tick_interval_seconds must be greater than zero");
        }
        if self.logout.method == LogoutMethod::Command && self.logout.command.is_empty() {
            anyhow::bail!("logout.command must not be empty when logout.method = \"command\"");
        }
        Ok(())
    }

    /// Durations for the activity tracker.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            idle_threshold: Duration::from_secs(self.idle_threshold_seconds),
            grace_period: Duration::from_secs(self.grace_period_seconds),
            tick_interval: Duration::from_secs(self.tick_interval_seconds),
        }
    }
}
