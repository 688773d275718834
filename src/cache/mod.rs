//! Local cache for file references: passes local paths through, downloads
//! remote resources once and optionally extracts archives.

mod archive;
mod download;
mod meta;

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::uri::split_scheme;

pub use meta::CacheMeta;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "FILECFG_CACHE_DIR";

/// Everything a cache backend needs to turn a URI into a local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub uri: String,
    pub cache_dir: Option<PathBuf>,
    pub extract_archive: bool,
    pub force_extract: bool,
    pub quiet: bool,
}

impl CacheRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cache_dir: None,
            extract_archive: false,
            force_extract: false,
            quiet: false,
        }
    }
}

pub trait PathCache {
    fn cached_path(&self, request: &CacheRequest) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.cache_dir {
            Some(dir) => Self::new(dir),
            None => Self::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata recorded for a downloaded resource, if it is cached.
    pub fn meta(&self, uri: &str) -> Result<Option<CacheMeta>> {
        let entry = self.root.join(cache_key(uri));
        CacheMeta::load(&CacheMeta::sidecar(&entry))
    }

    fn root_for<'a>(&'a self, request: &'a CacheRequest) -> &'a Path {
        request.cache_dir.as_deref().unwrap_or(self.root.as_path())
    }
}

impl PathCache for Cache {
    fn cached_path(&self, request: &CacheRequest) -> Result<PathBuf> {
        let root = self.root_for(request);

        let located = match split_scheme(&request.uri) {
            None => local_path(Path::new(&request.uri))?,
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "file" => local_path(file_uri_path(&request.uri, rest)?)?,
                "http" | "https" => download::fetch(root, &request.uri, request.quiet)?,
                _ => {
                    return Err(Error::UnsupportedScheme {
                        scheme: scheme.to_string(),
                        uri: request.uri.clone(),
                    })
                }
            },
        };

        if !request.extract_archive {
            return Ok(located);
        }
        archive::extract_if_archive(root, &located, request.force_extract)
    }
}

/// Cache root when no explicit directory is given: `FILECFG_CACHE_DIR`, then
/// the settings file, then the platform cache directory.
pub fn default_cache_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &Settings::global().cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("filecfg")
}

/// Stable file name for a cached resource.
pub fn cache_key(resource: &str) -> String {
    hex::encode(Sha256::digest(resource.as_bytes()))
}

/// Path part of a `file://` URI. Only an empty or `localhost` authority
/// names this machine.
fn file_uri_path<'a>(uri: &str, rest: &'a str) -> Result<&'a Path> {
    let path = match rest.find('/') {
        Some(0) => rest,
        Some(index) if rest[..index].eq_ignore_ascii_case("localhost") => &rest[index..],
        _ => {
            return Err(Error::invalid_uri(
                uri,
                "file URI host must be empty or 'localhost'",
            ))
        }
    };
    Ok(Path::new(path))
}

fn local_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file {} not found", path.display()),
        )
        .into());
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cache_key() {
        let key = cache_key("https://example.com/file.txt");
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key("https://example.com/file.txt"));
        assert_ne!(key, cache_key("https://example.com/other.txt"));
    }

    #[test]
    fn local_path_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sample.txt");
        fs::write(&file, "hello").unwrap();

        let cache = Cache::new(dir.path().join("cache"));
        let resolved = cache
            .cached_path(&CacheRequest::new(file.to_str().unwrap()))
            .unwrap();
        assert_eq!(resolved, file);
        // Nothing is copied for local files
        assert!(!cache.root().exists());
    }

    #[test]
    fn file_scheme_resolves_locally() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sample.txt");
        fs::write(&file, "hello").unwrap();

        let cache = Cache::new(dir.path());
        let uri = format!("file://{}", file.display());
        assert_eq!(cache.cached_path(&CacheRequest::new(uri)).unwrap(), file);
    }

    #[test]
    fn file_scheme_accepts_localhost_authority() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sample.txt");
        fs::write(&file, "hello").unwrap();

        let cache = Cache::new(dir.path());
        let uri = format!("file://localhost{}", file.display());
        assert_eq!(cache.cached_path(&CacheRequest::new(uri)).unwrap(), file);

        let err = cache
            .cached_path(&CacheRequest::new("file://fileserver/share/a.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUri { .. }), "{err}");
    }

    #[test]
    fn missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());

        let missing = dir.path().join("nonexistent.txt");
        let err = cache
            .cached_path(&CacheRequest::new(missing.to_str().unwrap()))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn object_store_schemes_are_unsupported() {
        let cache = Cache::new(std::env::temp_dir());
        for uri in ["s3://bucket/key", "gs://bucket/key", "hf://org/model/file"] {
            let err = cache.cached_path(&CacheRequest::new(uri)).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedScheme { .. }),
                "{uri}: {err}"
            );
        }
    }

    #[test]
    fn meta_of_uncached_resource_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        assert!(cache.meta("https://example.com/never").unwrap().is_none());
    }

    #[test]
    fn from_settings_prefers_configured_dir() {
        let settings = Settings {
            cache_dir: Some(PathBuf::from("/srv/cache")),
            ..Settings::default()
        };
        assert_eq!(Cache::from_settings(&settings).root(), Path::new("/srv/cache"));
    }
}
