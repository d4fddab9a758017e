use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use warden_aio::fs::create_dir_all;
use warden_aio::install_archive;
use warden_common::config::Options;
use warden_common::error::{Result, WardenError};
use warden_common::{ArtifactCache, ArtifactId, Target};

use crate::validation::{validate_url, verify_gzip};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "warden endpoint agent (Rust)";

/// Where versioned archives are published.
///
/// `<base_url>/<vendor>/<base-name>/<platform>/<base-name>-<version>.tar.gz`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionEndpoint {
    pub base_url: String,
    pub vendor: String,
    pub require_https: bool,
}

impl DistributionEndpoint {
    pub fn new(base_url: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            vendor: vendor.into(),
            require_https: true,
        }
    }

    pub fn from_options(options: &Options) -> Self {
        Self {
            base_url: options.dist_base_url.clone(),
            vendor: options.dist_vendor.clone(),
            require_https: options.require_https,
        }
    }

    pub fn allow_http(mut self) -> Self {
        self.require_https = false;
        self
    }

    fn tar_path(&self, base_name: &str, version: &str, platform: &str) -> String {
        format!(
            "{}/{}/{}/{}-{}.tar.gz",
            self.vendor, base_name, platform, base_name, version
        )
    }

    pub fn artifact_url(&self, id: &ArtifactId) -> String {
        let base_name = id.base_name();
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.tar_path(&base_name, &id.version, id.platform.as_str())
        )
    }
}

impl Default for DistributionEndpoint {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

/// Downloads versioned artifacts into an [`ArtifactCache`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    endpoint: DistributionEndpoint,
}

impl Fetcher {
    pub fn new(endpoint: DistributionEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            endpoint,
        })
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        Self::new(DistributionEndpoint::from_options(options))
    }

    /// Downloads and unpacks `name` at `version` for `target` unless the cache
    /// already holds it, returning the path of the extracted `binary_name`.
    ///
    /// A cache hit does no network I/O. There is no retry here; a non-200
    /// answer is `RemoteFetchFailed` and the caller decides what to do.
    /// Cancelling `token` aborts the in-flight transfer.
    pub async fn fetch_binary(
        &self,
        token: &CancellationToken,
        cache_dir: &Path,
        name: &str,
        binary_name: &str,
        version: &str,
        target: Target,
    ) -> Result<PathBuf> {
        let cache = ArtifactCache::new(cache_dir)?;
        let id = ArtifactId::new(name, target.platform, version);

        if let Some(path) = cache.resolve(&id, binary_name) {
            return Ok(path);
        }

        let url = self.endpoint.artifact_url(&id);
        validate_url(&url, self.endpoint.require_https)?;
        debug!("Starting download of {} from {}", id, url);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(WardenError::Cancelled(format!("download of {id}")));
            }
            res = self.client.get(&url).send() => res.map_err(|e| {
                debug!("HTTP request failed for {url}: {e}");
                WardenError::from(e)
            })?,
        };

        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if status != StatusCode::OK {
            error!("Failed download of {}. Got http status {}", url, status);
            return Err(WardenError::RemoteFetchFailed { url, status });
        }

        create_dir_all(cache.dir())?;
        let archive_path = cache.archive_path(&id);
        // The archive is only a side artifact; a partial one is overwritten by
        // the next attempt and never consulted by resolve().
        download_to(token, response, &archive_path, &id).await?;

        verify_gzip(&archive_path, &id.to_string())?;
        install_archive(&cache, &id, binary_name).await
    }
}

async fn download_to(
    token: &CancellationToken,
    mut response: reqwest::Response,
    archive_path: &Path,
    id: &ArtifactId,
) -> Result<()> {
    let incomplete = |e: &dyn std::fmt::Display| {
        WardenError::DownloadIncomplete(id.to_string(), e.to_string())
    };

    let mut file = TokioFile::create(archive_path).await.map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!(
                "couldn't create archive file {}: {}",
                archive_path.display(),
                e
            ),
        )
    })?;

    let mut written: u64 = 0;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(WardenError::Cancelled(format!("download of {id}")));
            }
            chunk = response.chunk() => chunk.map_err(|e| incomplete(&e))?,
        };
        let Some(chunk) = chunk else { break };
        file.write_all(&chunk).await.map_err(|e| incomplete(&e))?;
        written += chunk.len() as u64;
    }

    // Closed before extraction is attempted.
    file.flush().await.map_err(|e| incomplete(&e))?;
    file.sync_all().await.map_err(|e| incomplete(&e))?;
    drop(file);
    debug!("Wrote {} bytes to {}", written, archive_path.display());
    Ok(())
}

fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| WardenError::Validation(format!("Failed to build HTTP client: {e}")))
}
