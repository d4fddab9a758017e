/*
File: warden-aio/src/fs.rs
Purpose: Primitive filesystem operations used by the cache and the scanner.
*/
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error};
use warden_common::error::{Result, WardenError};

/// Permissions for directories the agent creates (rwxr-xr-x).
pub const DIR_MODE: u32 = 0o755;

/// Creates a directory and all its parent components with `DIR_MODE`.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        WardenError::from(e)
    })
}

/// Removes a file. A missing file is not an error.
pub fn remove_file(path: &Path) -> Result<()> {
    debug!("Removing file: {}", path.display());
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WardenError::from(e)),
    }
}

/// Removes a directory and all its contents recursively. A missing directory
/// is not an error.
pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    debug!("Removing directory recursively: {}", path.display());
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WardenError::from(e)),
    }
}
