use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use linklens::prelude::*;

#[derive(Parser)]
#[command(
    name = "linklens",
    about = "Resolve douyin/xiaohongshu share links into structured media descriptors"
)]
struct Cli {
    /// Message or URL containing a share link
    message: String,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Forwarding relay base URL (overrides the config file)
    #[arg(long)]
    relay: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linklens=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }

    let lens = LinkLens::new(config)?;
    let descriptor = lens.resolve_message(&cli.message).await?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}
