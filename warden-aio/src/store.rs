// warden-aio/src/store.rs
// Writes complete cache entries: archive first, then extraction, then a check
// that the binary landed where resolve() will look for it.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::debug;
use warden_common::error::{Result, WardenError};
use warden_common::{ArtifactCache, ArtifactId};

use crate::extract::extract_tar_gz_async;
use crate::fs::{create_dir_all, remove_directory_recursive, DIR_MODE};

/// Writes `archive_bytes` to the entry's archive path, then installs it.
pub async fn store_archive(
    cache: &ArtifactCache,
    id: &ArtifactId,
    binary_name: &str,
    archive_bytes: &[u8],
) -> Result<PathBuf> {
    create_dir_all(cache.dir())?;
    let archive_path = cache.archive_path(id);
    let mut file = tokio::fs::File::create(&archive_path).await?;
    file.write_all(archive_bytes).await.map_err(|e| {
        WardenError::DownloadIncomplete(id.to_string(), format!("write archive: {e}"))
    })?;
    file.sync_all().await?;
    drop(file);
    install_archive(cache, id, binary_name).await
}

/// Extracts an archive that is already fully written and closed at
/// `cache.archive_path(id)`. Extraction goes to a staging directory next to
/// the entry and is renamed into place only once the binary is present, so a
/// failed or partial unpack never leaves a resolvable binary behind.
pub async fn install_archive(
    cache: &ArtifactCache,
    id: &ArtifactId,
    binary_name: &str,
) -> Result<PathBuf> {
    let archive_path = cache.archive_path(id);
    let entry_dir = cache.entry_dir(id);

    create_dir_all(cache.dir())?;
    let staged = tempfile::Builder::new()
        .prefix(&format!(".{}.partial-", id.dir_name()))
        .tempdir_in(cache.dir())
        .map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("couldn't create staging directory in {}: {}", cache.dir().display(), e),
            )
        })?;

    debug!(
        "Installing {} via {}",
        archive_path.display(),
        staged.path().display()
    );
    extract_tar_gz_async(&archive_path, staged.path()).await?;

    if !staged.path().join(binary_name).is_file() {
        return Err(WardenError::ExtractionIncomplete(
            archive_path.display().to_string(),
            format!("archive has no '{binary_name}'"),
        ));
    }

    // Staging dirs are created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(DIR_MODE))?;
    }

    // Another fetch of the same artifact may have finished first.
    if let Some(existing) = cache.resolve(id, binary_name) {
        debug!("{} was installed concurrently; discarding staged copy", id);
        return Ok(existing);
    }
    remove_directory_recursive(&entry_dir)?;
    std::fs::rename(staged.path(), &entry_dir).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!(
                "couldn't move {} into place at {}: {}",
                staged.path().display(),
                entry_dir.display(),
                e
            ),
        )
    })?;

    cache.verify_entry(id, binary_name)
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use warden_common::Platform;

    use super::*;

    fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Incompressible bytes, so a cut archive still holds part of the binary.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn dirs_in(path: &std::path::Path) -> Vec<PathBuf> {
        std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect()
    }

    #[tokio::test]
    async fn store_then_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(tmp.path().join("cache")).unwrap();
        let id = ArtifactId::new("agent", Platform::Windows, "1.2.3");

        let path = store_archive(&cache, &id, "agent.exe", &tar_gz(&[("agent.exe", b"MZ")]))
            .await
            .unwrap();

        assert_eq!(
            path,
            tmp.path()
                .join("cache")
                .join("agent-windows-1.2.3")
                .join("agent.exe")
        );
        assert!(cache.archive_path(&id).is_file());
        assert_eq!(cache.resolve(&id, "agent.exe"), Some(path));
    }

    #[tokio::test]
    async fn archive_without_binary_is_extraction_incomplete() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(tmp.path()).unwrap();
        let id = ArtifactId::new("agent", Platform::Linux, "2.0.0");

        let err = store_archive(&cache, &id, "agent", &tar_gz(&[("README", b"no binary")]))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::ExtractionIncomplete(..)));
        assert!(cache.resolve(&id, "agent").is_none());
    }

    #[tokio::test]
    async fn truncated_archive_leaves_nothing_resolvable() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(tmp.path()).unwrap();
        let id = ArtifactId::new("agent", Platform::Windows, "1.2.3");
        let payload = noise(2_000_000);
        let full = tar_gz(&[("agent.exe", payload.as_slice())]);

        let err = store_archive(&cache, &id, "agent.exe", &full[..full.len() / 2])
            .await
            .unwrap_err();

        assert!(matches!(err, WardenError::ExtractionIncomplete(..)), "{err:?}");
        assert!(!cache.binary_path(&id, "agent.exe").exists());
        assert!(cache.resolve(&id, "agent.exe").is_none());
        assert!(dirs_in(tmp.path()).is_empty(), "{:?}", dirs_in(tmp.path()));
    }

    #[tokio::test]
    async fn install_replaces_entry_without_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(tmp.path()).unwrap();
        let id = ArtifactId::new("agent", Platform::Linux, "3.1.0");
        let stale = cache.entry_dir(&id);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("leftover"), b"old").unwrap();

        let path = store_archive(&cache, &id, "agent", &tar_gz(&[("agent", b"\x7fELF")]))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"\x7fELF");
        assert!(!stale.join("leftover").exists());
        assert_eq!(dirs_in(tmp.path()), vec![stale]);
    }

    #[tokio::test]
    async fn unusable_cache_dir_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let cache = ArtifactCache::new(blocker.join("cache")).unwrap();
        let id = ArtifactId::new("agent", Platform::Linux, "1.0.0");

        let err = install_archive(&cache, &id, "agent").await.unwrap_err();
        assert!(matches!(err, WardenError::Io(_)), "{err:?}");
    }
}
