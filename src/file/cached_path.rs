use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::{Cache, CacheRequest, PathCache};
use crate::error::Result;
use crate::file::base::{open_local, FileConfig, FileReader};

/// A local path or remote URL resolved through the download cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPathConfig {
    /// Local path, `file://` URI or http(s) URL.
    pub uri: String,

    /// Cache root for this file. Defaults to the process-wide cache root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Extract the resolved file when it is a tar archive and return the
    /// extraction directory.
    #[serde(default)]
    pub extract_archive: bool,

    /// Extract again even when the extraction directory already exists.
    #[serde(default)]
    pub force_extract: bool,

    /// Log download progress at debug level only.
    #[serde(default)]
    pub quiet: bool,
}

pub type CachedPath = CachedPathConfig;

impl CachedPathConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cache_dir: None,
            extract_archive: false,
            force_extract: false,
            quiet: false,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref().to_string_lossy())
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn with_extract_archive(mut self, extract_archive: bool) -> Self {
        self.extract_archive = extract_archive;
        self
    }

    pub fn with_force_extract(mut self, force_extract: bool) -> Self {
        self.force_extract = force_extract;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn request(&self) -> CacheRequest {
        CacheRequest {
            uri: self.uri.clone(),
            cache_dir: self.cache_dir.clone(),
            extract_archive: self.extract_archive,
            force_extract: self.force_extract,
            quiet: self.quiet,
        }
    }

    /// Resolves through `cache`. Every call goes to the backend; nothing is
    /// memoized on the config itself.
    pub fn resolve_with(&self, cache: &dyn PathCache) -> Result<PathBuf> {
        cache.cached_path(&self.request())
    }

    pub fn open_with(&self, cache: &dyn PathCache) -> Result<FileReader> {
        let path = self.resolve_with(cache)?;
        open_local(&path)
    }
}

impl FileConfig for CachedPathConfig {
    fn resolve(&self) -> Result<PathBuf> {
        self.resolve_with(&Cache::default())
    }
}

/// Resolves `uri` with default options in one call.
pub fn cached_path(uri: &str) -> Result<PathBuf> {
    CachedPathConfig::new(uri).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::io::Read;

    /// Records every request and answers with a fixed path.
    struct RecordingCache {
        answer: PathBuf,
        requests: RefCell<Vec<CacheRequest>>,
    }

    impl RecordingCache {
        fn new(answer: impl Into<PathBuf>) -> Self {
            Self {
                answer: answer.into(),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl PathCache for RecordingCache {
        fn cached_path(&self, request: &CacheRequest) -> Result<PathBuf> {
            self.requests.borrow_mut().push(request.clone());
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn defaults() {
        let config = CachedPathConfig::new("https://example.com/file.txt");
        assert_eq!(config.uri, "https://example.com/file.txt");
        assert_eq!(config.cache_dir, None);
        assert!(!config.extract_archive);
        assert!(!config.force_extract);
        assert!(!config.quiet);
    }

    #[test]
    fn resolve_forwards_options_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RecordingCache::new(dir.path().join("cached_file.txt"));
        let cache_dir = dir.path().join("cache");

        let config = CachedPathConfig::new("https://example.com/archive.tar.gz")
            .with_cache_dir(&cache_dir)
            .with_extract_archive(true)
            .with_force_extract(true)
            .with_quiet(true);
        let result = config.resolve_with(&cache).unwrap();

        assert_eq!(result, dir.path().join("cached_file.txt"));
        assert_eq!(
            *cache.requests.borrow(),
            vec![CacheRequest {
                uri: "https://example.com/archive.tar.gz".to_string(),
                cache_dir: Some(cache_dir),
                extract_archive: true,
                force_extract: true,
                quiet: true,
            }]
        );
    }

    #[test]
    fn every_resolve_reaches_the_cache() {
        let cache = RecordingCache::new("/tmp/cached_file.txt");
        let config = CachedPathConfig::new("https://example.com/file.txt");

        config.resolve_with(&cache).unwrap();
        config.resolve_with(&cache).unwrap();

        let requests = cache.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], CacheRequest::new("https://example.com/file.txt"));
    }

    #[test]
    fn open_reads_resolved_file() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("sample.bin");
        fs::write(&sample, b"\x00\x01\x02\x03\xff\xfe\xfd").unwrap();
        let cache = RecordingCache::new(&sample);

        let config = CachedPathConfig::new("https://example.com/file.bin");
        let mut content = Vec::new();
        config
            .open_with(&cache)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();

        assert_eq!(content, b"\x00\x01\x02\x03\xff\xfe\xfd");
        assert_eq!(cache.requests.borrow().len(), 1);
    }

    #[test]
    fn local_file_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("sample.txt");
        fs::write(&sample, "Hello, World!\n").unwrap();

        let config = CachedPathConfig::from_path(&sample);
        assert_eq!(config.resolve().unwrap(), sample);
        assert_eq!(cached_path(sample.to_str().unwrap()).unwrap(), sample);

        let mut content = String::new();
        config.open().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello, World!\n");
    }

    #[test]
    fn missing_local_file_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = CachedPathConfig::from_path(dir.path().join("nonexistent.txt"));
        assert!(config.open().err().unwrap().is_not_found());
    }

    #[test]
    fn serializes_without_defaults_noise() {
        let config = CachedPathConfig::new("https://example.com/file.txt").with_quiet(true);
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("cache_dir"));

        let back: CachedPathConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
