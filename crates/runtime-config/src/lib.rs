//! Shared runtime configuration types.
//!
//! The server, the migration command and the client read `gantt.toml` using
//! these types. Every field has a default, so a missing file or a partial file
//! is valid. Environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "gantt.toml";

/// Store location override.
pub const ENV_DB_PATH: &str = "GANTT_DB_PATH";
/// Server port override.
pub const ENV_PORT: &str = "GANTT_PORT";
/// Public base URL override.
pub const ENV_BASE_URL: &str = "GANTT_BASE_URL";

/// Store location used when neither the file nor the environment names one.
pub const DEFAULT_DB_PATH: &str = "data/gantt.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Top-level configuration (persisted as `gantt.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GanttConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a migration waits for another instance holding the write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

/// Client-side reachability polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectivitySettings {
    /// Poll interval while the server is known to be up.
    #[serde(default = "default_up_interval_secs")]
    pub up_interval_secs: u64,
    /// Poll interval while the server is down or not yet probed.
    #[serde(default = "default_down_interval_secs")]
    pub down_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            up_interval_secs: default_up_interval_secs(),
            down_interval_secs: default_down_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl ConnectivitySettings {
    pub fn up_interval(&self) -> Duration {
        Duration::from_secs(self.up_interval_secs)
    }

    pub fn down_interval(&self) -> Duration {
        Duration::from_secs(self.down_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Zero intervals would poll without pause; a zero timeout fails every probe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("connectivity.up_interval_secs", self.up_interval_secs),
            ("connectivity.down_interval_secs", self.down_interval_secs),
            ("connectivity.probe_timeout_secs", self.probe_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}
fn default_busy_timeout_ms() -> u64 {
    30_000
}
fn default_port() -> u16 {
    3000
}
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_up_interval_secs() -> u64 {
    30
}
fn default_down_interval_secs() -> u64 {
    5
}
fn default_probe_timeout_secs() -> u64 {
    5
}

/// Load `path` if it exists, otherwise defaults. Environment overrides are
/// applied on top in both cases, then the connectivity settings are checked.
pub fn load(path: &Path) -> Result<GanttConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        GanttConfig::default()
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    config.connectivity.validate()?;
    Ok(config)
}

/// Apply `GANTT_*` overrides read through `lookup`. Empty values are ignored.
pub fn apply_env_overrides(
    config: &mut GanttConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(path) = get(ENV_DB_PATH) {
        config.store.path = PathBuf::from(path);
    }
    if let Some(port) = get(ENV_PORT) {
        config.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_PORT,
            value: port,
        })?;
    }
    if let Some(url) = get(ENV_BASE_URL) {
        config.server.base_url = url;
    }
    Ok(())
}
