// warden-net/src/validation.rs
use std::path::Path;

use url::Url;
use warden_common::error::{Result, WardenError};

/// Validates a distribution URL. `https` is required unless the endpoint was
/// explicitly configured to allow plain `http`.
pub fn validate_url(url_str: &str, require_https: bool) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| WardenError::Validation(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if !require_https => Ok(()),
        scheme => Err(WardenError::Validation(format!(
            "Invalid URL scheme for '{url_str}': Must be https, but got '{scheme}'"
        ))),
    }
}

/// Checks the magic bytes of a downloaded archive before it is extracted.
pub fn verify_gzip(path: &Path, label: &str) -> Result<()> {
    match infer::get_from_path(path)? {
        Some(kind) if kind.extension() == "gz" => {
            tracing::debug!("Content type verified: {} is gzip", path.display());
            Ok(())
        }
        Some(kind) => Err(WardenError::ExtractionIncomplete(
            label.to_string(),
            format!(
                "Content type mismatch for {}: expected gzip, but detected '{}'",
                path.display(),
                kind.extension()
            ),
        )),
        None => Err(WardenError::ExtractionIncomplete(
            label.to_string(),
            format!("Could not determine content type for {}", path.display()),
        )),
    }
}
