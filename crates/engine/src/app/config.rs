use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::display::ElementId;

pub const RECOVERY_DELAYS_ENV_VAR: &str = "ADVENTURE_RECOVERY_DELAYS_MS";

const DEFAULT_CONTAINER_ID: &str = "gameContainer";
const DEFAULT_CANVAS_ID: &str = "gameCanvas";
const DEFAULT_CONSISTENCY_CHECK_DELAY_MS: u64 = 500;
const DEFAULT_RECOVERY_PASS_DELAYS_MS: [u64; 5] = [100, 300, 500, 1000, 2000];
const DEFAULT_FORCED_Z_INDEX: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub container_id: String,
    pub primary_canvas_id: String,
    /// Root that content resolves relative asset paths against.
    pub asset_root: PathBuf,
    pub consistency_check_delay_ms: u64,
    pub recovery_pass_delays_ms: Vec<u64>,
    pub forced_z_index: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            primary_canvas_id: DEFAULT_CANVAS_ID.to_string(),
            asset_root: PathBuf::new(),
            consistency_check_delay_ms: DEFAULT_CONSISTENCY_CHECK_DELAY_MS,
            recovery_pass_delays_ms: DEFAULT_RECOVERY_PASS_DELAYS_MS.to_vec(),
            forced_z_index: DEFAULT_FORCED_Z_INDEX,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json{}: {source}", at_path(.path))]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid recovery delay list '{value}': expected comma-separated milliseconds")]
    InvalidDelayList { value: String },
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Self>(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            ConfigError::Parse {
                path,
                source: error.into_inner(),
            }
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies environment overrides; invalid values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        match env::var(RECOVERY_DELAYS_ENV_VAR) {
            Ok(value) => match parse_delay_list(&value) {
                Ok(delays) => self.recovery_pass_delays_ms = delays,
                Err(error) => {
                    warn!(
                        env_var = RECOVERY_DELAYS_ENV_VAR,
                        error = %error,
                        "invalid recovery delay env var value; falling back to config"
                    );
                }
            },
            Err(env::VarError::NotPresent) => {}
            Err(error) => {
                warn!(
                    env_var = RECOVERY_DELAYS_ENV_VAR,
                    error = %error,
                    "unable to read recovery delay env var; falling back to config"
                );
            }
        }
        self
    }

    pub fn container_element(&self) -> ElementId {
        ElementId::new(self.container_id.as_str())
    }

    pub fn primary_canvas(&self) -> ElementId {
        ElementId::new(self.primary_canvas_id.as_str())
    }

    pub fn consistency_check_delay(&self) -> Duration {
        Duration::from_millis(self.consistency_check_delay_ms)
    }

    pub fn recovery_pass_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.recovery_pass_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
    }
}

fn at_path(path: &str) -> String {
    if path.is_empty() || path == "." {
        String::new()
    } else {
        format!(" at {path}")
    }
}

pub(crate) fn parse_delay_list(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|entry| entry.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidDelayList {
            value: raw.to_string(),
        })
}
