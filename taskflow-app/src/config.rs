/// Configuration for the TaskFlow client.
/// Reads config.json from ~/.config/taskflow/config.json (or platform equivalent).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskflowConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_timer_tick_ms")]
    pub timer_tick_ms: u64,
    /// Broadcast capacity per subscribed collection.
    #[serde(default = "default_snapshot_buffer")]
    pub snapshot_buffer: usize,
    #[serde(default)]
    pub demo_account: Option<DemoAccount>,
}

/// Credentials the headless client signs in with (registering on first use).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_timer_tick_ms() -> u64 {
    1000
}

fn default_snapshot_buffer() -> usize {
    64
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_file: None,
            timer_tick_ms: default_timer_tick_ms(),
            snapshot_buffer: default_snapshot_buffer(),
            demo_account: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Default config path: ~/.config/taskflow/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskflow")
        .join("config.json")
}

/// Read config from path. `Ok(None)` when the file doesn't exist.
///
/// Nothing is logged here: this runs before the logger is installed, so the
/// caller reports the outcome once logging is up.
pub fn read_config(path: &Path) -> Result<Option<TaskflowConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

pub fn save_config(path: &Path, config: &TaskflowConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
