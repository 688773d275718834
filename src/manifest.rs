use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::file::{resolve_file_config, AnyFileConfig};

/// Named file references loaded from a TOML document:
///
/// ```toml
/// [files]
/// hosts = "/etc/hosts"
/// weights = { uri = "https://example.com/weights.tar.gz", extract_archive = true }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, AnyFileConfig>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn get(&self, name: &str) -> Option<&AnyFileConfig> {
        self.files.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let config = self
            .get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        resolve_file_config(config)
    }

    /// Resolves every entry, keeping going past failures.
    pub fn resolve_all(&self) -> Vec<(String, Result<PathBuf>)> {
        self.files
            .iter()
            .map(|(name, config)| (name.clone(), resolve_file_config(config)))
            .collect()
    }
}
