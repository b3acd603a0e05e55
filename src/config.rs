// src/config.rs

//! Scheduler configuration loaded from a TOML file.
//!
//! Deserialization applies defaults via `serde` + `Default` impls;
//! [`load_config`] is the recommended entry point and also runs basic
//! sanity validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Result, SchedulerError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// SQLite database file; `:memory:` also works for throwaway setups.
    pub db_path: PathBuf,
    /// Connection pool size.
    pub max_connections: u32,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// Finished jobs older than this are skipped at recovery. Negative
    /// means no retention limit.
    pub finished_job_window_secs: i64,
    /// When false, a job's runtime rows (tasks, dependencies) are purged as
    /// soon as it finishes; task results always survive.
    pub store_runtime_data_after_finish: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("jobdag.sqlite"),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            finished_job_window_secs: -1,
            store_runtime_data_after_finish: true,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(SchedulerError::InvalidQuery(
                "max_connections must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(SchedulerError::InvalidQuery(
                "db_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read TOML from `path`, apply defaults and validate.
pub fn load_config(path: impl AsRef<Path>) -> Result<SchedulerConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: SchedulerConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
