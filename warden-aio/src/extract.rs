// warden-aio/src/extract.rs
// Handles gzip-tar extraction for cache entries.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, error};
use warden_common::error::{Result, WardenError};

/// Extracts a `.tar.gz` archive into `target_dir` on the blocking pool.
///
/// Entries with absolute paths or `..` components are rejected; unix
/// permission bits are preserved so extracted binaries stay executable.
pub async fn extract_tar_gz_async(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let target_dir = target_dir.to_path_buf();
    let label = archive_label(&archive_path);
    tokio::task::spawn_blocking(move || extract_tar_gz(&archive_path, &target_dir))
        .await
        .map_err(|e| {
            WardenError::ExtractionIncomplete(label, format!("JoinError in TAR extraction: {e}"))
        })?
}

/// Synchronous variant of [`extract_tar_gz_async`].
pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let label = archive_label(archive_path);
    debug!(
        "Extracting archive '{}' to '{}'",
        archive_path.display(),
        target_dir.display()
    );

    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive.entries().map_err(|e| {
        WardenError::ExtractionIncomplete(label.clone(), format!("Failed to read TAR: {e}"))
    })?;
    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| {
            WardenError::ExtractionIncomplete(
                label.clone(),
                format!("Error reading TAR entry: {e}"),
            )
        })?;
        let original_path: PathBuf = entry
            .path()
            .map_err(|e| {
                WardenError::ExtractionIncomplete(
                    label.clone(),
                    format!("Invalid path in TAR entry: {e}"),
                )
            })?
            .into_owned();

        let target_path = safe_join(target_dir, &original_path).ok_or_else(|| {
            error!(
                "Unsafe path {} in {}",
                original_path.display(),
                archive_path.display()
            );
            WardenError::ExtractionIncomplete(
                label.clone(),
                format!("Unsafe path component in {}", original_path.display()),
            )
        })?;

        entry.unpack_in(target_dir).map_err(|e| {
            error!(
                "Failed to unpack TAR entry {} to {}: {}",
                original_path.display(),
                target_path.display(),
                e
            );
            WardenError::ExtractionIncomplete(
                label.clone(),
                format!("Failed to unpack {}: {e}", original_path.display()),
            )
        })?;
        debug!("Unpacked TAR entry to: {}", target_path.display());
    }

    debug!("Finished TAR extraction for {}", archive_path.display());
    Ok(())
}

fn safe_join(target_dir: &Path, entry_path: &Path) -> Option<PathBuf> {
    let mut out = target_dir.to_path_buf();
    for comp in entry_path.components() {
        match comp {
            Component::Normal(p) => out.push(p),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn archive_label(archive_path: &Path) -> String {
    archive_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
