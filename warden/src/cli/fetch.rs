//! Contains the logic for the `fetch` command.
use tokio_util::sync::CancellationToken;
use warden_common::error::Result;
use warden_common::{Options, Platform, Target};
use warden_net::Fetcher;

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Artifact name, as published
    #[arg(long)]
    pub name: String,

    /// File name of the binary inside the archive (defaults to the name,
    /// with `.exe` for windows)
    #[arg(long)]
    pub binary: Option<String>,

    #[arg(long)]
    pub version: String,

    /// Target platform (defaults to the current one)
    #[arg(long)]
    pub platform: Option<Platform>,
}

impl FetchArgs {
    pub async fn run(&self, options: Options) -> Result<i32> {
        let platform = self.platform.unwrap_or_else(Platform::current);
        let binary = self.binary.clone().unwrap_or_else(|| match platform {
            Platform::Windows if !self.name.ends_with(".exe") => format!("{}.exe", self.name),
            _ => self.name.clone(),
        });

        let token = CancellationToken::new();
        let on_ctrl_c = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("Ctrl+C received; cancelling fetch");
                on_ctrl_c.cancel();
            }
        });

        let fetcher = Fetcher::from_options(&options)?;
        let path = fetcher
            .fetch_binary(
                &token,
                &options.cache_dir(),
                &self.name,
                &binary,
                &self.version,
                Target::new(platform),
            )
            .await?;
        println!("{}", path.display());
        Ok(0)
    }
}
