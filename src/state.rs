use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Cluster ids created by rosaform, keyed by cluster name.
///
/// This is only an address book. The remote document is re-read on every
/// command and stays the source of truth.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Bindings {
    #[serde(default)]
    pub clusters: BTreeMap<String, Binding>,

    /// Last time the file was written
    pub last_updated: Option<DateTime<Utc>>,
}

/// Where a named cluster lives on the control plane
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Binding {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Bindings Implementation
// ============================================================================

impl Bindings {
    /// Get the state directory path (~/.local/state/rosaform)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("rosaform"))
    }

    /// Get the state file path
    pub fn state_file() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("state.json"))
    }

    /// Load bindings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::state_file()?)
    }

    /// Save bindings to the default location
    pub fn save(&mut self) -> Result<()> {
        self.save_to(&Self::state_file()?)
    }

    /// Load bindings from `path`, or return empty bindings if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, starting empty");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded {} bindings from {}", state.clusters.len(), path.display());
        Ok(state)
    }

    /// Save bindings to `path`, creating parent directories
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(&self).context("Failed to serialize state")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Cluster id bound to `name`
    pub fn id(&self, name: &str) -> Option<&str> {
        self.clusters.get(name).map(|b| b.id.as_str())
    }

    /// Record that `name` lives at `id`
    ///
    /// Rebinding to the same id only bumps `updated_at`.
    pub fn bind(&mut self, name: &str, id: &str) {
        let now = Utc::now();
        match self.clusters.get_mut(name) {
            Some(binding) if binding.id == id => binding.updated_at = now,
            _ => {
                self.clusters.insert(
                    name.to_string(),
                    Binding {
                        id: id.to_string(),
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
    }

    /// Forget `name`, returning the id it was bound to
    pub fn unbind(&mut self, name: &str) -> Option<String> {
        self.clusters.remove(name).map(|b| b.id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_state() {
        let state = Bindings::default();
        assert!(state.clusters.is_empty());
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut state = Bindings::default();
        state.bind("my-cluster", "abc");
        assert_eq!(state.id("my-cluster"), Some("abc"));

        let created = state.clusters["my-cluster"].created_at;
        state.bind("my-cluster", "abc");
        assert_eq!(state.clusters["my-cluster"].created_at, created);

        state.bind("my-cluster", "def");
        assert_eq!(state.id("my-cluster"), Some("def"));

        assert_eq!(state.unbind("my-cluster"), Some("def".to_string()));
        assert_eq!(state.id("my-cluster"), None);
        assert_eq!(state.unbind("my-cluster"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = Bindings::default();
        state.bind("a", "1");
        state.bind("b", "2");
        state.save_to(&path).unwrap();

        let loaded = Bindings::load_from(&path).unwrap();
        assert_eq!(loaded.id("a"), Some("1"));
        assert_eq!(loaded.id("b"), Some("2"));
        assert!(loaded.last_updated.is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let state = Bindings::load_from(&dir.path().join("state.json")).unwrap();
        assert!(state.clusters.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Bindings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
