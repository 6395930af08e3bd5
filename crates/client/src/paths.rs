//! Cross-platform application paths

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the per-user config directory. Nothing is created; the client
    /// only reads from it.
    pub fn new() -> Result<Self, String> {
        let base = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(Self::at(base.join("cartographer")))
    }

    pub fn at(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}
