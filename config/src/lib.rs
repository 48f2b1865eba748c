//! Configuration for the Pledge scheduler.
//!
//! Configuration is optional. The file is looked up at `$PLEDGE_CONFIG` if set,
//! otherwise at `<config dir>/pledge/config.toml`. A missing file means
//! defaults; an unreadable or malformed file is reported as [`ConfigError`].
//!
//! ```toml
//! [scheduler]
//! thread_name = "pledge-timer"
//! shutdown = "drain"        # or "cancel"
//! join_timeout_ms = 2000
//!
//! [rejections]
//! log_unhandled = true
//! ```

use std::{
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "PLEDGE_CONFIG";

pub const DEFAULT_THREAD_NAME: &str = "pledge-timer";
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 2_000;

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

const fn default_join_timeout_ms() -> u64 {
    DEFAULT_JOIN_TIMEOUT_MS
}

#[derive(Debug, Default, Deserialize)]
pub struct PledgeConfig {
    pub scheduler: Option<SchedulerConfig>,
    pub rejections: Option<RejectionConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Settings for the background timer thread.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Name given to the worker thread (visible in debuggers and panics).
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// What happens to queued deferred jobs when the scheduler shuts down.
    #[serde(default)]
    pub shutdown: ShutdownPolicy,
    /// Upper bound on how long shutdown waits for the worker to exit.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            shutdown: ShutdownPolicy::default(),
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Shutdown behaviour for deferred jobs that are queued but not yet run.
///
/// Pending timers are always cancelled; this only concerns work that was
/// already due.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Run queued jobs before the worker exits.
    #[default]
    Drain,
    /// Drop queued jobs.
    Cancel,
}

impl ShutdownPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drain => "drain",
            Self::Cancel => "cancel",
        }
    }
}

/// Reporting of rejections that reach a terminal handler unhandled.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RejectionConfig {
    /// Log unhandled rejections at error level. Custom hooks still run when
    /// this is off.
    #[serde(default = "default_true")]
    pub log_unhandled: bool,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            log_unhandled: true,
        }
    }
}

impl PledgeConfig {
    /// Load the config file from its default location.
    ///
    /// Returns `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Load from the default location, falling back to defaults on any error.
    #[must_use]
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(err) => {
                tracing::warn!("Using default scheduler config: {err}");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn rejections(&self) -> RejectionConfig {
        self.rejections.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Option<PathBuf> {
    resolve_config_path(env::var_os(CONFIG_ENV_VAR), dirs::config_dir())
}

fn resolve_config_path(
    override_path: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match override_path {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => config_dir.map(|dir| dir.join("pledge").join("config.toml")),
    }
}
