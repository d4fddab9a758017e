// warden-core/src/update/newest.rs
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use warden_aio::fs::{remove_directory_recursive, remove_file};
use warden_common::error::{Result, WardenError};
use warden_common::Platform;

use super::version::split_versioned;

/// Behaviour switches for [`find_newest`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    delete_old: bool,
    cache_dir: Option<PathBuf>,
    family: Option<Family>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Family {
    prefix: String,
    binary_name: String,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// After picking the newest, remove every other version except the one
    /// the running binary lives in.
    pub fn delete_old_updates(mut self) -> Self {
        self.delete_old = true;
        self
    }

    /// Scan this directory instead of the running binary's grandparent.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Scan an explicit artifact family, for binaries running from outside
    /// the cache.
    pub fn family(
        mut self,
        name: impl AsRef<str>,
        platform: Platform,
        binary_name: impl Into<String>,
    ) -> Self {
        self.family = Some(Family {
            prefix: format!("{}-{}-", name.as_ref(), platform),
            binary_name: binary_name.into(),
        });
        self
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Extracted binary of the newest complete version, `None` when the cache
    /// holds no candidates yet (first run).
    pub newest: Option<PathBuf>,
    pub newest_version: Option<Version>,
    pub removed: Vec<PathBuf>,
    /// Entries that could not be deleted, with the reason. Never fatal.
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug)]
struct Candidate {
    version: Version,
    dir: PathBuf,
    complete: bool,
}

/// Finds the newest cached version in the running binary's artifact family.
///
/// Versions are compared with semver precedence. With
/// [`FindOptions::delete_old_updates`] all other versions are removed on a
/// best-effort basis, except the running binary's own directory.
#[instrument(skip_all, fields(running = %running_binary.display()))]
pub async fn find_newest(
    token: &CancellationToken,
    running_binary: &Path,
    opts: FindOptions,
) -> Result<ScanReport> {
    let token = token.clone();
    let running_binary = running_binary.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&token, &running_binary, &opts))
        .await
        .map_err(|e| WardenError::Supervision(format!("version scan task failed: {e}")))?
}

fn scan(token: &CancellationToken, running_binary: &Path, opts: &FindOptions) -> Result<ScanReport> {
    let mut report = ScanReport::default();
    let running_dir = running_binary.parent().map(Path::to_path_buf);

    let (family, derived_root) = match &opts.family {
        Some(family) => (family.clone(), running_dir.as_deref().and_then(Path::parent)),
        None => {
            let Some(dir_name) = running_dir
                .as_deref()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
            else {
                debug!("Running binary has no parent directory; nothing to scan");
                return Ok(report);
            };
            let Some((prefix, _)) = split_versioned(dir_name) else {
                debug!(
                    "{} is not a versioned cache entry; nothing to scan",
                    dir_name
                );
                return Ok(report);
            };
            let binary_name = running_binary
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (
                Family {
                    prefix: prefix.to_string(),
                    binary_name,
                },
                running_dir.as_deref().and_then(Path::parent),
            )
        }
    };

    let Some(root) = opts.cache_dir.clone().or_else(|| derived_root.map(Path::to_path_buf)) else {
        debug!("No cache root could be derived; nothing to scan");
        return Ok(report);
    };

    let candidates = collect_candidates(&root, &family)?;
    let newest = candidates
        .iter()
        .filter(|c| c.complete)
        .max_by(|a, b| a.version.cmp(&b.version));

    let Some(newest) = newest else {
        debug!(
            "No complete versions of {}* under {}",
            family.prefix,
            root.display()
        );
        return Ok(report);
    };
    report.newest = Some(newest.dir.join(&family.binary_name));
    report.newest_version = Some(newest.version.clone());
    debug!("Newest version found: {}", newest.dir.display());

    if !opts.delete_old {
        return Ok(report);
    }

    for candidate in &candidates {
        if token.is_cancelled() {
            info!("Version cleanup cancelled");
            break;
        }
        if candidate.dir == newest.dir || is_running_dir(&candidate.dir, running_dir.as_deref()) {
            continue;
        }
        if !candidate.complete && candidate.version > newest.version {
            debug!(
                "Leaving incomplete newer entry {} (possibly being fetched)",
                candidate.dir.display()
            );
            continue;
        }

        match remove_directory_recursive(&candidate.dir) {
            Ok(()) => {
                debug!("Removed old update {}", candidate.dir.display());
                let archive = archive_for(&candidate.dir);
                if let Err(e) = remove_file(&archive) {
                    warn!(
                        "Failed to remove old archive {}: {}",
                        archive.display(),
                        e
                    );
                }
                report.removed.push(candidate.dir.clone());
            }
            Err(e) => {
                // The OS may still hold a previously running binary open.
                warn!(
                    "Failed to remove old update {}: {}",
                    candidate.dir.display(),
                    e
                );
                report.failed.push((candidate.dir.clone(), e.to_string()));
            }
        }
    }

    Ok(report)
}

fn collect_candidates(root: &Path, family: &Family) -> Result<Vec<Candidate>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Cache root {} does not exist yet", root.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(WardenError::from(e)),
    };

    let mut candidates = Vec::new();
    for entry_res in entries {
        let entry = match entry_res {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading entry in {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(family.prefix.as_str()) else {
            continue;
        };
        let Some(version) = super::version::parse_lenient(suffix) else {
            debug!("Skipping {}: unparseable version '{}'", name, suffix);
            continue;
        };
        let complete = path.join(&family.binary_name).is_file();
        candidates.push(Candidate {
            version,
            dir: path,
            complete,
        });
    }
    Ok(candidates)
}

fn is_running_dir(dir: &Path, running_dir: Option<&Path>) -> bool {
    let Some(running_dir) = running_dir else {
        return false;
    };
    if dir == running_dir {
        return true;
    }
    match (dir.canonicalize(), running_dir.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn archive_for(dir: &Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".tar.gz");
    dir.with_file_name(name)
}
