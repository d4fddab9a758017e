// warden-common/src/cache.rs
// Layout and lookups for the local artifact cache. Writing entries lives in
// warden-aio, deleting them in the version scanner.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{Result, WardenError};
use crate::model::ArtifactId;

/// Local store of downloaded, extracted artifacts keyed by
/// (name, platform, version).
///
/// ```text
/// <cache_dir>/<name>-<platform>-<version>/<binary>
/// <cache_dir>/<name>-<platform>-<version>.tar.gz
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    cache_dir: PathBuf,
}

impl ArtifactCache {
    /// Fails with `InvalidCacheDir` for an empty path, before touching disk.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if cache_dir.as_os_str().is_empty() {
            return Err(WardenError::InvalidCacheDir(
                "empty cache dir argument".to_string(),
            ));
        }
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn entry_dir(&self, id: &ArtifactId) -> PathBuf {
        self.cache_dir.join(id.dir_name())
    }

    pub fn binary_path(&self, id: &ArtifactId, binary_name: &str) -> PathBuf {
        self.entry_dir(id).join(binary_name)
    }

    pub fn archive_path(&self, id: &ArtifactId) -> PathBuf {
        self.cache_dir.join(id.archive_name())
    }

    /// Returns the extracted binary if the entry is complete. Only the binary
    /// counts; a leftover archive on its own is not a hit.
    pub fn resolve(&self, id: &ArtifactId, binary_name: &str) -> Option<PathBuf> {
        let binary = self.binary_path(id, binary_name);
        if binary.is_file() {
            debug!("Cache hit for {}: {}", id, binary.display());
            Some(binary)
        } else {
            debug!("Cache miss for {} ({})", id, binary.display());
            None
        }
    }

    /// Post-extraction check: the binary must exist at its final path.
    pub fn verify_entry(&self, id: &ArtifactId, binary_name: &str) -> Result<PathBuf> {
        let binary = self.binary_path(id, binary_name);
        match std::fs::metadata(&binary) {
            Ok(meta) if meta.is_file() => Ok(binary),
            Ok(_) => Err(WardenError::ExtractionIncomplete(
                id.to_string(),
                format!("{} is not a regular file", binary.display()),
            )),
            Err(e) => {
                debug!("Missing local binary {}: {}", binary.display(), e);
                Err(WardenError::ExtractionIncomplete(
                    id.to_string(),
                    format!("local binary {} does not exist but it should", binary.display()),
                ))
            }
        }
    }
}
