//! Contains the logic for the `cleanup` command.
use std::path::PathBuf;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use warden_common::error::Result;
use warden_common::Options;
use warden_core::{find_newest, FindOptions};

#[derive(clap::Args, Debug)]
pub struct CleanupArgs {
    /// Binary to treat as running (defaults to this executable)
    #[arg(long, value_name = "PATH")]
    pub running: Option<PathBuf>,

    /// Remove every version except the newest and the running one
    #[arg(long)]
    pub delete: bool,
}

impl CleanupArgs {
    pub async fn run(&self, options: Options) -> Result<i32> {
        let running = match &self.running {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };

        let mut find = FindOptions::new();
        if let Some(cache_dir) = &options.cache_dir {
            find = find.cache_dir(cache_dir);
        }
        if self.delete {
            find = find.delete_old_updates();
        }

        let report = find_newest(&CancellationToken::new(), &running, find).await?;

        match &report.newest {
            Some(newest) => println!("{} {}", "==> Newest:".bold().blue(), newest.display()),
            None => println!("{}", "==> No cached versions found".bold().blue()),
        }
        for removed in &report.removed {
            println!("Removed {}", removed.display());
        }
        for (path, reason) in &report.failed {
            eprintln!("{} {}: {}", "Warning:".yellow(), path.display(), reason);
        }
        Ok(0)
    }
}
