use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Persisted mapping from normalized wiki id to remote artifact id.
///
/// Written once by a creation phase and read by the content phase. Entries
/// are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap {
    entries: BTreeMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a map written by [`IdMap::save`]. A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse id map {}", path.display()))
    }

    /// Load a map that an earlier phase must already have written.
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "id map {} does not exist; run the phase that creates it first",
                path.display()
            );
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered =
            serde_json::to_string_pretty(&self.entries).context("failed to serialize id map")?;
        fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Add an entry. Re-inserting the same pair is a no-op; pointing an
    /// existing key at a different remote id is refused.
    pub fn insert(&mut self, key: impl Into<String>, remote_id: impl Into<String>) -> Result<()> {
        let key = key.into();
        let remote_id = remote_id.into();
        if let Some(existing) = self.entries.get(&key) {
            if *existing == remote_id {
                return Ok(());
            }
            return Err(MigrateError::DuplicateId {
                key,
                existing: existing.clone(),
                incoming: remote_id,
            }
            .into());
        }
        self.entries.insert(key, remote_id);
        Ok(())
    }

    /// Remote id for a normalized key. Empty keys never resolve.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}
