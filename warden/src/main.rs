// warden/src/main.rs
use std::process;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::{debug, error};
use warden_common::Options;

mod cli;
mod logging;

use cli::CliArgs;

fn load_options(cli_args: &CliArgs) -> anyhow::Result<Options> {
    let mut options = Options::load(cli_args.config.as_deref())
        .context("Could not load warden options")?;
    cli_args.apply(&mut options);
    if cli_args.command.is_foreground() {
        options = options.into_foreground();
    }
    options.validate().context("Invalid warden options")?;
    Ok(options)
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let options = match load_options(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
    };

    let guard = logging::init(&options, cli_args.command.is_foreground());
    debug!("Running {:?} with {:?}", cli_args.command, options);

    let code = match cli_args.command.run(options).await {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {}", e);
            debug!("Command failed: {:?}", e);
            eprintln!("{}: {}", "Error".red().bold(), e);
            1
        }
    };

    debug!("Exiting with status {}", code);
    // process::exit skips destructors; flush the file writer first.
    drop(guard);
    process::exit(code);
}
