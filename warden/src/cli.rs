// warden/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use warden_common::error::Result;
use warden_common::Options;

// Module declarations
pub mod cleanup;
pub mod fetch;
pub mod foreground;
pub mod svc;

use crate::cli::cleanup::CleanupArgs;
use crate::cli::fetch::FetchArgs;
use crate::cli::foreground::Foreground;
use crate::cli::svc::Svc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "warden", bin_name = "warden")]
pub struct CliArgs {
    /// TOML options file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root directory for state and debug.log
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub debug: bool,

    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// Layers CLI flags over file and environment options.
    pub fn apply(&self, options: &mut Options) {
        if let Some(root) = &self.root {
            options.root_directory = Some(root.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            options.cache_dir = Some(cache_dir.clone());
        }
        if self.debug {
            options.debug = true;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run under the host service manager
    Svc(Svc),
    /// Run in the foreground with verbose logging, for debugging
    #[command(name = "svc-fg")]
    SvcFg(Foreground),
    /// Download and unpack one artifact version into the cache
    Fetch(FetchArgs),
    /// Report the newest cached version, optionally removing the rest
    Cleanup(CleanupArgs),
}

impl Command {
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::SvcFg(_))
    }

    /// Returns the process exit status.
    pub async fn run(&self, options: Options) -> Result<i32> {
        match self {
            Self::Svc(command) => command.run(options).await,
            Self::SvcFg(command) => command.run(options).await,
            Self::Fetch(command) => command.run(options).await,
            Self::Cleanup(command) => command.run(options).await,
        }
    }
}
