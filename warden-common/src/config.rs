// warden-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{Result, WardenError};

const DEFAULT_SERVICE_NAME: &str = "warden";
const DEFAULT_DIST_BASE_URL: &str = "https://dl.warden.sh";
const DEFAULT_DIST_VENDOR: &str = "warden";
const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(15);
const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(100);
const DEFAULT_INTERROGATE_DELAY: Duration = Duration::from_millis(100);

/// Parsed agent options. Handed to the supervision context by its caller;
/// nothing in the core parses flags itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub root_directory: Option<PathBuf>,
    pub debug: bool,
    /// Ask the supervised process for verbose output.
    pub process_verbose: bool,
    pub service_name: String,
    pub cache_dir: Option<PathBuf>,
    pub dist_base_url: String,
    pub dist_vendor: String,
    pub require_https: bool,
    #[serde(with = "humantime_serde")]
    pub cleanup_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub interrogate_delay: Duration,
    /// Path to the managed binary, or the artifact name to look up in the cache.
    pub supervised_binary: Option<String>,
    pub supervised_args: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            root_directory: None,
            debug: false,
            process_verbose: false,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            cache_dir: None,
            dist_base_url: DEFAULT_DIST_BASE_URL.to_string(),
            dist_vendor: DEFAULT_DIST_VENDOR.to_string(),
            require_https: true,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            stop_grace: DEFAULT_STOP_GRACE,
            interrogate_delay: DEFAULT_INTERROGATE_DELAY,
            supervised_binary: None,
            supervised_args: Vec::new(),
        }
    }
}

impl Options {
    /// Loads options from an optional TOML file, then applies `WARDEN_*`
    /// environment overrides. CLI flags are layered on top by the caller.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        debug!("Loading warden options");
        let mut options = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        options.apply_env();
        debug!("Options loaded successfully.");
        Ok(options)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading options file {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WardenError::Config(format!(
                "Failed to read options file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Some(root) = env::var_os("WARDEN_ROOT").filter(|s| !s.is_empty()) {
            self.root_directory = Some(PathBuf::from(root));
        }
        if let Some(cache) = env::var_os("WARDEN_CACHE_DIR").filter(|s| !s.is_empty()) {
            self.cache_dir = Some(PathBuf::from(cache));
        }
        if let Ok(url) = env::var("WARDEN_DIST_URL") {
            if !url.is_empty() {
                self.dist_base_url = url;
            }
        }
        if env::var("WARDEN_DEBUG").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            self.debug = true;
        }
    }

    /// Rejects configurations that would fail later, before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(WardenError::Config("service name must not be empty".into()));
        }
        if !(self.dist_base_url.starts_with("https://") || self.dist_base_url.starts_with("http://"))
        {
            return Err(WardenError::Config(format!(
                "distribution url '{}' must be http(s)",
                self.dist_base_url
            )));
        }
        if let Some(cache) = &self.cache_dir {
            if cache.as_os_str().is_empty() {
                return Err(WardenError::InvalidCacheDir("empty cache dir argument".into()));
            }
        }
        Ok(())
    }

    /// Root directory, falling back to the per-user data directory.
    pub fn root_dir(&self) -> PathBuf {
        self.root_directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(&self.service_name)
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.root_dir().join("cache"))
    }

    pub fn debug_log_path(&self) -> Option<PathBuf> {
        self.root_directory.as_ref().map(|root| root.join("debug.log"))
    }

    /// Settings forced on by the foreground/debug variant.
    pub fn into_foreground(mut self) -> Self {
        self.debug = true;
        self.process_verbose = true;
        self
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = Options::default();
        assert_eq!(opts.cleanup_delay, Duration::from_secs(15));
        assert_eq!(opts.stop_grace, Duration::from_millis(100));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn toml_overrides_durations_and_paths() {
        let opts = Options::from_toml(
            r#"
            root_directory = "/var/warden"
            debug = true
            cleanup_delay = "2m"
            stop_grace = "250ms"
            supervised_binary = "osqueryd"
            "#,
        )
        .unwrap();
        assert_eq!(opts.cleanup_delay, Duration::from_secs(120));
        assert_eq!(opts.stop_grace, Duration::from_millis(250));
        assert_eq!(opts.cache_dir(), PathBuf::from("/var/warden/cache"));
        assert_eq!(
            opts.debug_log_path(),
            Some(PathBuf::from("/var/warden/debug.log"))
        );
        assert!(opts.debug);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Options::from_toml("no_such_key = 1").is_err());
    }

    #[test]
    fn empty_service_name_or_cache_dir_fails_validation() {
        let opts = Options {
            service_name: "  ".into(),
            ..Options::default()
        };
        assert!(matches!(opts.validate(), Err(WardenError::Config(_))));

        let opts = Options {
            cache_dir: Some(PathBuf::new()),
            ..Options::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(WardenError::InvalidCacheDir(_))
        ));
    }

    #[test]
    fn foreground_forces_verbose_flags() {
        let opts = Options::default().into_foreground();
        assert!(opts.debug);
        assert!(opts.process_verbose);
    }
}
