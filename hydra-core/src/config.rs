//! Daemon configuration at `<home>/.hydra/config.yaml`.
//!
//! Every field is optional; a missing file yields [`HydratorConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::hydra_root;
use crate::types::RepoCredentials;

pub const CONFIG_FILE: &str = "config.yaml";

/// How long a successful or in-flight operation stays fresh before the
/// trigger policy re-hydrates it anyway.
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_TRIGGER_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydratorConfig {
    pub status_timeout_secs: u64,
    /// Cadence of the per-target trigger sweep.
    pub trigger_interval_secs: u64,
    /// Number of concurrent batch workers.
    pub workers: usize,
    /// Root of the local destination tree; defaults to `<home>/.hydra/destinations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write_credentials: Vec<RepoCredentials>,
}

impl Default for HydratorConfig {
    fn default() -> Self {
        Self {
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
            trigger_interval_secs: DEFAULT_TRIGGER_INTERVAL_SECS,
            workers: DEFAULT_WORKERS,
            destination_root: None,
            write_credentials: Vec::new(),
        }
    }
}

impl HydratorConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Never zero; `tokio::time::interval` panics on a zero period.
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs.max(1))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn destination_root(&self, home: &Path) -> PathBuf {
        self.destination_root
            .clone()
            .unwrap_or_else(|| hydra_root(home).join("destinations"))
    }

    /// Registered write credentials for `repo_url`, if any.
    pub fn credentials_for(&self, repo_url: &str) -> Option<&RepoCredentials> {
        self.write_credentials
            .iter()
            .find(|creds| creds.repo_url == repo_url)
    }
}

/// `<home>/.hydra/config.yaml` (pure, no I/O).
pub fn config_path_at(home: &Path) -> PathBuf {
    hydra_root(home).join(CONFIG_FILE)
}

/// Load the config, falling back to defaults when the file does not exist.
pub fn load_at(home: &Path) -> Result<HydratorConfig, StoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(HydratorConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(HydratorConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// Write the config if none exists yet. Returns whether a file was created.
pub fn init_at(home: &Path, config: &HydratorConfig) -> Result<bool, StoreError> {
    let path = config_path_at(home);
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(hydra_root(home))?;
    let tmp = path.with_file_name(format!("{CONFIG_FILE}.tmp"));
    std::fs::write(&tmp, serde_yaml::to_string(config)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(true)
}
