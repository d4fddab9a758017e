// warden-common/src/model/artifact.rs
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Operating system an artifact was built for. Used verbatim in cache
/// directory names and in the remote lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Darwin,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "darwin" | "macos" => Ok(Platform::Darwin),
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            other => Err(WardenError::Validation(format!(
                "Unknown platform '{other}'"
            ))),
        }
    }
}

/// Packaging target an artifact is fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub platform: Platform,
}

impl Target {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn current() -> Self {
        Self::new(Platform::current())
    }
}

/// Identity of one fetched artifact. Immutable once fetched; it alone decides
/// where the artifact lives in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub name: String,
    pub platform: Platform,
    pub version: String,
}

impl ArtifactId {
    pub fn new(name: impl Into<String>, platform: Platform, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform,
            version: version.into(),
        }
    }

    /// `name-platform-version`, the cache entry directory.
    pub fn dir_name(&self) -> String {
        format!("{}-{}-{}", self.name, self.platform, self.version)
    }

    /// `name-platform-version.tar.gz`, the archive kept next to the entry.
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.dir_name())
    }

    /// Name with any file extension stripped. The distribution host indexes
    /// artifacts by base name only.
    pub fn base_name(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
