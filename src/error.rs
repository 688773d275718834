use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Unsupported URI scheme '{scheme}' in {uri}")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error(
        "The '{feature}' feature is required to {action}; \
         rebuild filecfg with `--features {feature}`"
    )]
    FeatureDisabled {
        feature: &'static str,
        action: String,
    },

    #[error("Failed to download {uri}")]
    Download {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Download of {uri} failed with HTTP status {status}")]
    DownloadStatus { uri: String, status: u16 },

    #[error("Failed to extract {path}: {reason}")]
    Extract { path: PathBuf, reason: String },

    #[error("SSH config file not found: {0}")]
    SshConfigNotFound(PathBuf),

    #[error("Host '{0}' not found in SSH config")]
    HostNotFound(String),

    #[error("ProxyJump chain through '{0}' loops or is too deep")]
    ProxyLoop(String),

    #[error("Password authentication is only supported on the target host, not on proxy hop '{0}'")]
    ProxyPassword(String),

    #[error("'{program}' executable not found: {hint}")]
    MissingExecutable {
        program: String,
        hint: &'static str,
    },

    #[error("Manifest has no entry named '{0}'")]
    EntryNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Cache metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist temporary file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl Error {
    pub(crate) fn invalid_uri(uri: &str, reason: &str) -> Self {
        Error::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the underlying cause is a missing file, whichever kind of
    /// file config produced it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::SshConfigNotFound(_) => true,
            Error::DownloadStatus { status, .. } => *status == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_report_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::Io(io).is_not_found());
        assert!(Error::SshConfigNotFound(PathBuf::from("/nope")).is_not_found());
        assert!(Error::DownloadStatus {
            uri: "https://example.com/a.txt".to_string(),
            status: 404,
        }
        .is_not_found());

        assert!(!Error::DownloadStatus {
            uri: "https://example.com/a.txt".to_string(),
            status: 500,
        }
        .is_not_found());
        assert!(!Error::HostNotFound("web".to_string()).is_not_found());
    }
}
