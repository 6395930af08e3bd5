//! Client configuration.
//!
//! Resolution order: built-in defaults, then `config.json` in the user config
//! directory (or an explicit `--config` file), then `CARTOGRAPHER_*`
//! environment variables. CLI flags are applied last by the binary.

use std::fs;
use std::path::Path;
use std::time::Duration;

use cartographer::api::Operation;
use cartographer::ui_model;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::AppPaths;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Analysis, bias analysis, bias scoring and RAG.
    pub analysis_timeout_secs: u64,
    /// Library, recommendations and repo update.
    pub quick_timeout_secs: u64,
    pub num_clusters: u32,
    pub num_samples: u32,
    pub default_model: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            analysis_timeout_secs: 120,
            quick_timeout_secs: 30,
            num_clusters: 5,
            num_samples: 100,
            default_model: ui_model::DEFAULT_MODEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults, overlaid with the config file and the environment.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match AppPaths::new() {
                Ok(paths) if paths.config_file().is_file() => {
                    Self::from_file(&paths.config_file())?
                }
                Ok(_) => Self::default(),
                Err(e) => {
                    warn!("{}; using built-in defaults", e);
                    Self::default()
                }
            },
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Overlay `CARTOGRAPHER_*` variables. Unparseable numbers are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // CARTOGRAPHER_API_URL=http://host:8000
        if let Some(v) = lookup("CARTOGRAPHER_API_URL") {
            let v = v.trim();
            if !v.is_empty() {
                self.base_url = v.to_string();
            }
        }

        // CARTOGRAPHER_TIMEOUT_SECS=300
        if let Some(v) = lookup("CARTOGRAPHER_TIMEOUT_SECS") {
            match v.trim().parse::<u64>() {
                Ok(n) => self.analysis_timeout_secs = n.max(1),
                Err(_) => warn!("Ignoring CARTOGRAPHER_TIMEOUT_SECS={}", v),
            }
        }

        if let Some(v) = lookup("CARTOGRAPHER_NUM_CLUSTERS") {
            match v.trim().parse::<u32>() {
                Ok(n) => self.num_clusters = n.max(1),
                Err(_) => warn!("Ignoring CARTOGRAPHER_NUM_CLUSTERS={}", v),
            }
        }

        if let Some(v) = lookup("CARTOGRAPHER_NUM_SAMPLES") {
            match v.trim().parse::<u32>() {
                Ok(n) => self.num_samples = n.max(1),
                Err(_) => warn!("Ignoring CARTOGRAPHER_NUM_SAMPLES={}", v),
            }
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            long: Duration::from_secs(self.analysis_timeout_secs.max(1)),
            quick: Duration::from_secs(self.quick_timeout_secs.max(1)),
        }
    }
}

/// Per-operation request deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub long: Duration,
    pub quick: Duration,
}

impl Timeouts {
    pub fn for_op(&self, op: Operation) -> Duration {
        if op.is_long_running() {
            self.long
        } else {
            self.quick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("cartographer-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"base_url": "http://gpu-box:9000", "num_samples": 250}"#).unwrap();

        let cfg = ClientConfig::from_file(&path).unwrap();
        assert_eq!(cfg.base_url, "http://gpu-box:9000");
        assert_eq!(cfg.num_samples, 250);
        assert_eq!(cfg.num_clusters, 5);
        assert_eq!(cfg.analysis_timeout_secs, 120);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ClientConfig::from_file(Path::new("/nonexistent/cartographer.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("CARTOGRAPHER_API_URL", " http://10.0.0.5:8000 "),
            ("CARTOGRAPHER_TIMEOUT_SECS", "300"),
            ("CARTOGRAPHER_NUM_CLUSTERS", "lots"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ClientConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.base_url, "http://10.0.0.5:8000");
        assert_eq!(cfg.analysis_timeout_secs, 300);
        assert_eq!(cfg.num_clusters, 5);
    }

    #[test]
    fn timeouts_split_by_operation_kind() {
        let t = ClientConfig::default().timeouts();
        assert_eq!(t.for_op(Operation::Analyze), Duration::from_secs(120));
        assert_eq!(t.for_op(Operation::Rag), Duration::from_secs(120));
        assert_eq!(t.for_op(Operation::Recommendations), Duration::from_secs(30));
        assert_eq!(t.for_op(Operation::FetchLibrary), Duration::from_secs(30));
    }
}
