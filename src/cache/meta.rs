use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Sidecar written next to every downloaded resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub resource: String,
    pub etag: Option<String>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl CacheMeta {
    pub fn sidecar(entry: &Path) -> PathBuf {
        let mut name = entry.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
