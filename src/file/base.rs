use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;
use crate::file::{CachedPathConfig, RemoteSshFileConfig};
use crate::uri::split_scheme;

/// Readable byte stream returned by [`FileConfig::open`].
pub type FileReader = Box<dyn Read + Send>;

/// A config value that resolves to an openable file.
pub trait FileConfig {
    /// Local filesystem path holding the file's content.
    fn resolve(&self) -> Result<PathBuf>;

    /// Opens the file for reading. Use `read_to_string` on the reader for
    /// text; it fails on invalid UTF-8.
    fn open(&self) -> Result<FileReader> {
        let path = self.resolve()?;
        open_local(&path)
    }
}

pub(crate) fn open_local(path: &Path) -> Result<FileReader> {
    let file = File::open(path)?;
    Ok(Box::new(BufReader::new(file)))
}

impl FileConfig for Path {
    fn resolve(&self) -> Result<PathBuf> {
        Ok(self.to_path_buf())
    }
}

impl FileConfig for PathBuf {
    fn resolve(&self) -> Result<PathBuf> {
        self.as_path().resolve()
    }
}

impl FileConfig for str {
    fn resolve(&self) -> Result<PathBuf> {
        Path::new(self).resolve()
    }
}

impl FileConfig for String {
    fn resolve(&self) -> Result<PathBuf> {
        self.as_str().resolve()
    }
}

impl<T: FileConfig + ?Sized> FileConfig for Box<T> {
    fn resolve(&self) -> Result<PathBuf> {
        (**self).resolve()
    }

    fn open(&self) -> Result<FileReader> {
        (**self).open()
    }
}

/// Any file reference a config document can carry.
///
/// Deserializes untagged: a plain string is a local path, a table with `uri`
/// is a cached path and a table with `ssh` and `remote_path` is a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyFileConfig {
    Path(PathBuf),
    CachedPath(CachedPathConfig),
    RemoteSsh(RemoteSshFileConfig),
}

impl AnyFileConfig {
    /// Picks the config kind from the string's shape: `ssh://` and `scp://`
    /// are remote files, any other scheme goes through the cache and
    /// everything else is a local path.
    pub fn from_uri(uri: &str) -> Result<Self> {
        match split_scheme(uri) {
            Some((scheme, _)) if is_ssh_scheme(scheme) => {
                Ok(AnyFileConfig::RemoteSsh(RemoteSshFileConfig::from_uri(uri)?))
            }
            Some(_) => Ok(AnyFileConfig::CachedPath(CachedPathConfig::new(uri))),
            None => Ok(AnyFileConfig::Path(PathBuf::from(uri))),
        }
    }
}

pub(crate) fn is_ssh_scheme(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("ssh") || scheme.eq_ignore_ascii_case("scp")
}

impl FromStr for AnyFileConfig {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_uri(s)
    }
}

impl FileConfig for AnyFileConfig {
    fn resolve(&self) -> Result<PathBuf> {
        match self {
            AnyFileConfig::Path(path) => path.resolve(),
            AnyFileConfig::CachedPath(config) => config.resolve(),
            AnyFileConfig::RemoteSsh(config) => config.resolve(),
        }
    }

    fn open(&self) -> Result<FileReader> {
        match self {
            AnyFileConfig::Path(path) => path.open(),
            AnyFileConfig::CachedPath(config) => config.open(),
            AnyFileConfig::RemoteSsh(config) => config.open(),
        }
    }
}

impl From<PathBuf> for AnyFileConfig {
    fn from(path: PathBuf) -> Self {
        AnyFileConfig::Path(path)
    }
}

impl From<&Path> for AnyFileConfig {
    fn from(path: &Path) -> Self {
        AnyFileConfig::Path(path.to_path_buf())
    }
}

impl From<CachedPathConfig> for AnyFileConfig {
    fn from(config: CachedPathConfig) -> Self {
        AnyFileConfig::CachedPath(config)
    }
}

impl From<RemoteSshFileConfig> for AnyFileConfig {
    fn from(config: RemoteSshFileConfig) -> Self {
        AnyFileConfig::RemoteSsh(config)
    }
}

pub fn resolve_file_config<C: FileConfig + ?Sized>(config: &C) -> Result<PathBuf> {
    let path = config.resolve()?;
    tracing::debug!("Resolved file config to {:?}", path);
    Ok(path)
}

pub fn open_file_config<C: FileConfig + ?Sized>(config: &C) -> Result<FileReader> {
    config.open()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SshConfig;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE_TEXT: &str = "Hello, World!\nThis is a test file.\n";
    const SAMPLE_BYTES: &[u8] = b"\x00\x01\x02\x03\xff\xfe\xfd";

    fn sample_text_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sample.txt");
        fs::write(&path, SAMPLE_TEXT).unwrap();
        path
    }

    fn read_string(mut reader: FileReader) -> String {
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        content
    }

    struct FixedFileConfig {
        path: PathBuf,
    }

    impl FileConfig for FixedFileConfig {
        fn resolve(&self) -> Result<PathBuf> {
            Ok(self.path.clone())
        }
    }

    #[test]
    fn plain_paths_resolve_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sample = sample_text_file(&dir);

        assert_eq!(resolve_file_config(&sample).unwrap(), sample);
        assert_eq!(resolve_file_config(sample.as_path()).unwrap(), sample);
        assert_eq!(resolve_file_config(sample.to_str().unwrap()).unwrap(), sample);
        assert_eq!(
            resolve_file_config(&sample.to_string_lossy().into_owned()).unwrap(),
            sample
        );
    }

    #[test]
    fn missing_path_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nonexistent.txt");
        assert_eq!(resolve_file_config(&missing).unwrap(), missing);
    }

    #[test]
    fn open_reads_text_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        let text = sample_text_file(&dir);
        let binary = dir.path().join("sample.bin");
        fs::write(&binary, SAMPLE_BYTES).unwrap();

        assert_eq!(read_string(open_file_config(text.to_str().unwrap()).unwrap()), SAMPLE_TEXT);

        let mut bytes = Vec::new();
        open_file_config(&binary)
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes, SAMPLE_BYTES);

        // Binary content is not valid text
        let mut text_out = String::new();
        assert!(open_file_config(&binary)
            .unwrap()
            .read_to_string(&mut text_out)
            .is_err());
    }

    #[test]
    fn opening_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nonexistent.txt");

        let err = open_file_config(&missing).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn custom_file_config_uses_default_open() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = FixedFileConfig {
            path: sample_text_file(&dir),
        };

        assert_eq!(resolve_file_config(&fixed).unwrap(), fixed.path);
        assert_eq!(read_string(open_file_config(&fixed).unwrap()), SAMPLE_TEXT);

        let boxed: Vec<Box<dyn FileConfig>> = vec![
            Box::new(fixed.path.clone()),
            Box::new(fixed),
        ];
        for config in &boxed {
            assert_eq!(read_string(open_file_config(config).unwrap()), SAMPLE_TEXT);
        }
    }

    #[test]
    fn from_uri_picks_kind() {
        assert_eq!(
            AnyFileConfig::from_uri("/data/model.bin").unwrap(),
            AnyFileConfig::Path(PathBuf::from("/data/model.bin"))
        );
        assert_eq!(
            "https://example.com/file.txt".parse::<AnyFileConfig>().unwrap(),
            AnyFileConfig::CachedPath(CachedPathConfig::new("https://example.com/file.txt"))
        );
        assert_eq!(
            AnyFileConfig::from_uri("scp://user@example.com/etc/motd").unwrap(),
            AnyFileConfig::RemoteSsh(RemoteSshFileConfig::new(
                SshConfig::new("example.com").with_username("user"),
                "/etc/motd",
            ))
        );
        assert!(AnyFileConfig::from_uri("ssh://example.com").is_err());
    }

    #[test]
    fn any_file_config_resolves_each_variant() {
        let dir = tempfile::tempdir().unwrap();
        let sample = sample_text_file(&dir);

        let configs: Vec<AnyFileConfig> = vec![
            sample.clone().into(),
            CachedPathConfig::new(sample.to_str().unwrap()).into(),
        ];
        for config in &configs {
            assert_eq!(resolve_file_config(config).unwrap(), sample);
            assert_eq!(read_string(open_file_config(config).unwrap()), SAMPLE_TEXT);
        }
    }

    #[test]
    fn deserializes_untagged() {
        #[derive(Deserialize)]
        struct Doc {
            local: AnyFileConfig,
            cached: AnyFileConfig,
            remote: AnyFileConfig,
        }

        let doc: Doc = toml::from_str(
            r#"
            local = "/etc/hosts"

            [cached]
            uri = "https://example.com/archive.tar.gz"
            extract_archive = true

            [remote]
            remote_path = "/var/log/syslog"
            [remote.ssh]
            hostname = "example.com"
            port = 2222
            "#,
        )
        .unwrap();

        assert_eq!(doc.local, AnyFileConfig::Path(PathBuf::from("/etc/hosts")));
        assert_eq!(
            doc.cached,
            AnyFileConfig::CachedPath(
                CachedPathConfig::new("https://example.com/archive.tar.gz")
                    .with_extract_archive(true)
            )
        );
        assert_eq!(
            doc.remote,
            AnyFileConfig::RemoteSsh(RemoteSshFileConfig::new(
                SshConfig::new("example.com").with_port(2222),
                "/var/log/syslog",
            ))
        );
    }
}
