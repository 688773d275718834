use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[cfg(feature = "archive")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

#[cfg(feature = "archive")]
impl ArchiveKind {
    /// Looks at the leading bytes of `path`. Plain files yield `None`.
    fn sniff(path: &Path) -> Result<Option<Self>> {
        use flate2::read::GzDecoder;
        use std::fs::File;

        if !path.is_file() {
            return Ok(None);
        }

        let head = read_head(File::open(path)?)?;
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Ok(Some(ArchiveKind::Zip));
        }
        if head.starts_with(&[0x1f, 0x8b]) {
            let inner = read_head(GzDecoder::new(File::open(path)?))?;
            return Ok(is_tar_header(&inner).then_some(ArchiveKind::TarGz));
        }
        Ok(is_tar_header(&head).then_some(ArchiveKind::Tar))
    }

    fn unpack(self, source: &Path, dest: &Path) -> Result<()> {
        use flate2::read::GzDecoder;
        use std::fs::File;

        let file = File::open(source)?;
        match self {
            ArchiveKind::Tar => tar::Archive::new(file).unpack(dest)?,
            ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(dest)?,
            ArchiveKind::Zip => zip::ZipArchive::new(file)
                .and_then(|mut archive| archive.extract(dest))
                .map_err(|e| Error::Extract {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                })?,
        }
        Ok(())
    }
}

#[cfg(feature = "archive")]
fn read_head(reader: impl std::io::Read) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut head = Vec::with_capacity(512);
    reader.take(512).read_to_end(&mut head)?;
    Ok(head)
}

/// POSIX and GNU tar headers carry "ustar" at offset 257.
#[cfg(feature = "archive")]
fn is_tar_header(head: &[u8]) -> bool {
    head.len() >= 262 && &head[257..262] == b"ustar"
}

/// Extracts `located` next to the cache entries when it is an archive and
/// returns the extraction directory; other files come back unchanged.
#[cfg(feature = "archive")]
pub(super) fn extract_if_archive(root: &Path, located: &Path, force: bool) -> Result<PathBuf> {
    use std::fs;

    let Some(kind) = ArchiveKind::sniff(located)? else {
        tracing::debug!("{:?} is not an archive, skipping extraction", located);
        return Ok(located.to_path_buf());
    };

    let target = root.join(format!("{}-extracted", extraction_key(located)?));
    if target.is_dir() && !force {
        tracing::debug!("Reusing extracted archive at {:?}", target);
        return Ok(target);
    }
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }

    fs::create_dir_all(root)?;
    tracing::info!("Extracting {:?} into {:?}", located, target);
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(root)?;
    kind.unpack(located, staging.path())?;
    fs::rename(staging.keep(), &target)?;

    Ok(target)
}

/// Names an extraction after the archive's absolute path and its last
/// modification, so rewriting the archive in place yields a fresh directory.
#[cfg(feature = "archive")]
fn extraction_key(located: &Path) -> Result<String> {
    use std::time::UNIX_EPOCH;

    let canonical = located.canonicalize()?;
    let metadata = canonical.metadata()?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    Ok(super::cache_key(&format!(
        "{}:{}:{}",
        canonical.display(),
        mtime,
        metadata.len()
    )))
}

#[cfg(not(feature = "archive"))]
pub(super) fn extract_if_archive(_root: &Path, located: &Path, _force: bool) -> Result<PathBuf> {
    Err(Error::FeatureDisabled {
        feature: "archive",
        action: format!("extract {}", located.display()),
    })
}


#[cfg(all(test, not(feature = "archive")))]
mod disabled_tests {
    use super::*;

    #[test]
    fn extraction_needs_archive_feature() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.tar.gz");
        std::fs::write(&file, "not inspected").unwrap();

        let err = extract_if_archive(dir.path(), &file, false).unwrap_err();
        assert!(matches!(err, Error::FeatureDisabled { feature: "archive", .. }));
        assert!(err.to_string().contains("--features archive"));
    }
}
