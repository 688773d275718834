//! File-reference configuration values.
//!
//! A file config is a value in a config document that names a file: a local
//! path, a URL resolved through the download cache, or a file on a remote
//! host reached over SSH. Every kind resolves to a local path and can be
//! opened for reading:
//!
//! ```no_run
//! use filecfg::{open_file_config, resolve_file_config, AnyFileConfig};
//! use std::io::Read;
//!
//! let config: AnyFileConfig = "ssh://deploy@example.com:2222/etc/app.toml".parse()?;
//! let local = resolve_file_config(&config)?;
//!
//! let mut content = String::new();
//! open_file_config(&config)?.read_to_string(&mut content)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
mod error;
pub mod file;
pub mod manifest;
pub mod settings;
pub mod ssh_config;
pub mod ssh_service;
mod uri;

pub use error::{Error, Result};
pub use file::{
    cached_path, open_file_config, resolve_file_config, AnyFileConfig, CachedPath,
    CachedPathConfig, FileConfig, FileReader, RemoteSshFileConfig, SshConfig,
};
pub use manifest::Manifest;
pub use settings::{Settings, SettingsManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
