//! Sync configuration.
//!
//! Persisted as JSON at `<home>/.manisync/config.json`. Every field is
//! optional on disk; missing fields take their defaults. Writes use the
//! `.tmp` + rename pattern.
//!
//! Like the store paths, each function has an `_at(home)` form for tests and
//! a no-arg form that resolves `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};

/// Default HTTP timeout for manifest and resource requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite database holding the manifest record and cached resources.
    pub db_path: PathBuf,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Delete cached resources that the new manifest no longer declares.
    pub prune: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("cache.sqlite3"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("manisync/{}", env!("CARGO_PKG_VERSION")),
            prune: false,
        }
    }
}

impl SyncConfig {
    /// Defaults with the database under `<home>/.manisync/`.
    pub fn default_at(home: &Path) -> Self {
        Self {
            db_path: state_dir_at(home).join("cache.sqlite3"),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `<home>/.manisync/`
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".manisync")
}

/// `<home>/.manisync/config.json`
pub fn config_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("config.json")
}

/// Load the config, falling back to [`SyncConfig::default_at`] when the file
/// does not exist. A config without `db_path` also gets the home default.
pub fn load_at(home: &Path) -> Result<SyncConfig, SyncError> {
    let path = config_path_at(home);
    let defaults = SyncConfig::default_at(home);
    if !path.exists() {
        return Ok(defaults);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    let mut config: SyncConfig = serde_json::from_value(value.clone())?;
    if value.get("db_path").is_none() {
        config.db_path = defaults.db_path;
    }
    Ok(config)
}

pub fn load() -> Result<SyncConfig, SyncError> {
    load_at(&home()?)
}

/// Save the config atomically.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<(), SyncError> {
    let dir = state_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = config_path_at(home);
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

fn home() -> Result<PathBuf, SyncError> {
    dirs::home_dir().ok_or(SyncError::HomeNotFound)
}
