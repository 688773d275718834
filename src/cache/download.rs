use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[cfg(feature = "http")]
pub(super) fn fetch(root: &Path, uri: &str, quiet: bool) -> Result<PathBuf> {
    use chrono::Utc;
    use reqwest::header::ETAG;
    use std::fs;
    use std::time::Duration;

    use super::{cache_key, CacheMeta};

    let target = root.join(cache_key(uri));
    let sidecar = CacheMeta::sidecar(&target);
    if target.exists() && sidecar.exists() {
        tracing::debug!("Cache hit for {} at {:?}", uri, target);
        return Ok(target);
    }

    fs::create_dir_all(root)?;
    if quiet {
        tracing::debug!("Downloading {} into {:?}", uri, root);
    } else {
        tracing::info!("Downloading {} into {:?}", uri, root);
    }

    let download_error = |e: reqwest::Error| Error::Download {
        uri: uri.to_string(),
        source: Box::new(e),
    };

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("filecfg/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(download_error)?;
    let mut response = client.get(uri).send().map_err(download_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::DownloadStatus {
            uri: uri.to_string(),
            status: status.as_u16(),
        });
    }

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Stage in the cache root so the final rename never crosses filesystems
    let mut staged = tempfile::NamedTempFile::new_in(root)?;
    let size = response.copy_to(&mut staged).map_err(download_error)?;
    staged.persist(&target)?;

    CacheMeta {
        resource: uri.to_string(),
        etag,
        size,
        created_at: Utc::now(),
    }
    .save(&sidecar)?;

    if quiet {
        tracing::debug!("Cached {} ({} bytes)", uri, size);
    } else {
        tracing::info!("Cached {} ({} bytes)", uri, size);
    }
    Ok(target)
}

#[cfg(not(feature = "http"))]
pub(super) fn fetch(_root: &Path, uri: &str, _quiet: bool) -> Result<PathBuf> {
    Err(Error::FeatureDisabled {
        feature: "http",
        action: format!("download {}", uri),
    })
}
