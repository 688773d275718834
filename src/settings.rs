use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Environment variable pointing at an alternative settings file.
pub const SETTINGS_ENV: &str = "FILECFG_CONFIG";

static GLOBAL: OnceLock<Settings> = OnceLock::new();

/// User-level defaults for resolving file configs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Root of the download cache. Falls back to the platform cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// OpenSSH client config consulted by host lookups.
    pub ssh_config: PathBuf,
    pub ssh_program: String,
    pub sshpass_program: String,
    pub connect_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let ssh_config = dirs::home_dir()
            .unwrap_or_default()
            .join(".ssh")
            .join("config");
        Self {
            cache_dir: None,
            ssh_config,
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Process-wide settings, loaded on first use from the settings file.
    ///
    /// A missing or unreadable file yields the defaults; the failure is logged.
    pub fn global() -> &'static Settings {
        GLOBAL.get_or_init(|| {
            SettingsManager::new()
                .and_then(|manager| manager.load())
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to load settings, using defaults: {}", e);
                    Settings::default()
                })
        })
    }

    /// Installs `settings` as the process-wide settings. Fails with the
    /// rejected value if settings were already loaded.
    pub fn install(settings: Settings) -> std::result::Result<(), Settings> {
        GLOBAL.set(settings)
    }
}

#[derive(Debug)]
pub struct SettingsManager {
    settings_file: PathBuf,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Ok(Self::with_path(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Settings("Could not find config directory".to_string()))?
            .join("filecfg");

        Ok(Self::with_path(config_dir.join("filecfg.toml")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            settings_file: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.settings_file
    }

    pub fn load(&self) -> Result<Settings> {
        if !self.settings_file.exists() {
            tracing::debug!(
                "No settings file at {:?}, using defaults",
                self.settings_file
            );
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.settings_file)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml = toml::to_string_pretty(settings)?;
        fs::write(&self.settings_file, toml)?;
        Ok(())
    }
}
