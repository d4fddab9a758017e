// warden-core/src/supervise/process.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use warden_common::error::{Result, WardenError};
use warden_common::Platform;

use super::{Runner, SupervisionContext};
use crate::update::{find_newest, FindOptions};

/// Runs the managed binary as a child process until it exits or the
/// context is cancelled.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    binary: Option<PathBuf>,
}

impl ProcessRunner {
    /// Resolves the binary from `Options::supervised_binary` at run time.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    async fn resolve_binary(&self, ctx: &SupervisionContext) -> Result<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        let options = ctx.options();
        let Some(configured) = options.supervised_binary.as_deref() else {
            return Err(WardenError::Config(
                "no supervised binary configured".to_string(),
            ));
        };

        let explicit = Path::new(configured);
        if explicit.is_file() {
            debug!("Using explicit supervised binary {}", explicit.display());
            return Ok(explicit.to_path_buf());
        }

        // Not a path: treat it as an artifact name and take the newest
        // cached version.
        let platform = Platform::current();
        let binary_name = match platform {
            Platform::Windows => format!("{configured}.exe"),
            _ => configured.to_string(),
        };
        let cache_dir = options.cache_dir();
        let family = FindOptions::new()
            .cache_dir(&cache_dir)
            .family(configured, platform, binary_name.as_str());
        let report = find_newest(ctx.token(), &cache_dir.join(&binary_name), family.clone()).await?;
        let Some(newest) = report.newest else {
            return Err(WardenError::Supervision(format!(
                "no cached version of '{}' under {}",
                configured,
                cache_dir.display()
            )));
        };

        let delay = options.cleanup_delay;
        let running = newest.clone();
        ctx.schedule(delay, move |token| async move {
            if let Err(e) = find_newest(&token, &running, family.delete_old_updates()).await {
                info!("Cleanup of old supervised versions failed: {}", e);
            }
        });
        Ok(newest)
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, ctx: &SupervisionContext) -> Result<()> {
        let binary = self.resolve_binary(ctx).await?;
        let options = ctx.options();

        let mut cmd = Command::new(&binary);
        cmd.args(&options.supervised_args);
        if options.process_verbose {
            cmd.arg("--verbose");
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        info!("Starting supervised process {}", binary.display());
        let mut child = cmd.spawn().map_err(|e| {
            WardenError::Supervision(format!("failed to spawn {}: {}", binary.display(), e))
        })?;

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                info!("Stopping supervised process {}", binary.display());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill supervised process: {}", e);
                }
                Ok(())
            }
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    info!("Supervised process exited cleanly");
                    Ok(())
                } else {
                    let code = status.code().unwrap_or(-1);
                    warn!("Supervised process exited with {}", status);
                    Err(WardenError::ProcessExited(code))
                }
            }
        }
    }
}
