//! File-reference config values

pub mod base;
pub mod cached_path;
pub mod ssh;

pub use base::{open_file_config, resolve_file_config, AnyFileConfig, FileConfig, FileReader};
pub use cached_path::{cached_path, CachedPath, CachedPathConfig};
pub use ssh::{RemoteSshFileConfig, SshConfig};
