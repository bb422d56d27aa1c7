use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::CredentialRecord;

/// Extension of persisted record files
const RECORD_EXTENSION: &str = "json";

/// Credential records on disk, one `<login>.json` file per Synergia account.
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, record: &CredentialRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.record_path(record.login())?;
        let contents = serde_json::to_string_pretty(&record.to_persisted())?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(login = record.login(), path = %path.display(), "Saved credential record");
        Ok(())
    }

    /// `Ok(None)` when no record exists for the login.
    pub fn load(&self, login: &str) -> Result<Option<CredentialRecord>> {
        let path = self.record_path(login)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    /// All readable records, sorted by login. Broken files are skipped.
    pub fn list(&self) -> Result<Vec<CredentialRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir).context("Failed to read record directory")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable credential record"),
            }
        }
        records.sort_by(|a, b| a.login().cmp(b.login()));
        Ok(records)
    }

    /// Returns whether a record was removed.
    pub fn remove(&self, login: &str) -> Result<bool> {
        let path = self.record_path(login)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn read_record(path: &Path) -> Result<CredentialRecord> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        CredentialRecord::from_json_value(value)
            .with_context(|| format!("Invalid credential record in {}", path.display()))
    }

    fn record_path(&self, login: &str) -> Result<PathBuf> {
        if login.is_empty() || login.contains(['/', '\\']) || login.starts_with('.') {
            anyhow::bail!("Invalid login for a record file name: {:?}", login);
        }
        Ok(self.dir.join(format!("{}.{}", login, RECORD_EXTENSION)))
    }
}
