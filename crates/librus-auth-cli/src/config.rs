//! CLI configuration management.
//!
//! Remembers the last portal e-mail and the preferred user agent between
//! runs in `~/.config/librus-auth/config.json`. Records and logs live under
//! the platform cache directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use librus_auth_core::UserAgent;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "librus-auth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_email: Option<String>,
    #[serde(default)]
    pub user_agent: UserAgent,
}

impl Config {
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(app_dir(dirs::config_dir(), "config")?.join(CONFIG_FILE))
    }

    /// Per-application cache directory holding records and logs.
    pub fn cache_dir() -> Result<PathBuf> {
        app_dir(dirs::cache_dir(), "cache")
    }

    /// One `<login>.json` per stored credential record.
    pub fn records_dir() -> Result<PathBuf> {
        Ok(Self::cache_dir()?.join("records"))
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::cache_dir()?.join("logs"))
    }
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf> {
    base.map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow::anyhow!("Could not find {} directory", kind))
}
