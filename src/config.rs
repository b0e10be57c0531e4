// ⚙️ Application Config - optional JSON file, every field has a default

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::taxonomy::HierarchyDefaults;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding expenses and curated hierarchy rows
    pub database_path: PathBuf,

    /// Fallback labels for the taxonomy
    pub defaults: HierarchyDefaults,

    /// tracing filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("expenses.db"),
            defaults: HierarchyDefaults::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let mut config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.defaults = config.defaults.sanitized();

        Ok(config)
    }

    /// Config file if given, built-in defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
