//! Durable storage of symbol overrides
//!
//! Overrides live in a single JSON file. A missing file means "no overrides".

use super::SymbolOverrides;
use crate::config::AppConfig;
use crate::error::{AdsError, Result, ResultExt};
use std::path::{Path, PathBuf};

/// JSON file holding [`SymbolOverrides`]
#[derive(Debug, Clone)]
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the location named by the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(config.overrides_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted overrides
    pub fn load(&self) -> Result<SymbolOverrides> {
        if !self.path.exists() {
            return Ok(SymbolOverrides::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            AdsError::Config(format!("Failed to read overrides {:?}: {}", self.path, e))
        })?;

        if content.trim().is_empty() {
            return Ok(SymbolOverrides::default());
        }

        serde_json::from_str::<SymbolOverrides>(&content)
            .map_err(AdsError::from)
            .with_context(|| format!("Failed to parse overrides {:?}", self.path))
    }

    /// Replace the persisted overrides
    pub fn save(&self, overrides: &SymbolOverrides) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AdsError::Config(format!("Failed to create overrides directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(overrides)?;

        std::fs::write(&self.path, content).map_err(|e| {
            AdsError::Config(format!("Failed to write overrides {:?}: {}", self.path, e))
        })?;

        tracing::debug!("Wrote symbol overrides to {:?}", self.path);
        Ok(())
    }

    /// Delete the persisted overrides
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AdsError::Config(format!(
                "Failed to delete overrides {:?}: {}",
                self.path, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, DeviceVariant};

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("none.json"));
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("sub").join("overrides.json"));

        let mut overrides = SymbolOverrides::default();
        overrides.set(ActionKind::Run, DeviceVariant::V3, true, "X.Y");
        store.save(&overrides).unwrap();
        assert_eq!(store.load().unwrap(), overrides);

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("overrides.json"));
        std::fs::write(store.path(), "{ \"run\": 1 ").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err.root(), AdsError::Serialization(_)));
        assert!(err.to_string().contains("overrides.json"));
    }

    #[test]
    fn test_unknown_control_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("overrides.json"));
        std::fs::write(store.path(), r#"{ "jump": { "V2": "MAIN.Jump" } }"#).unwrap();
        assert!(matches!(store.load().unwrap_err().root(), AdsError::Serialization(_)));
    }
}
