//! Warden reconciler entry point.
//!
//! Parses flags, installs logging, loads configuration and runs one
//! reconciliation pass. Any error is logged and turned into a non-zero exit.
use clap::Parser;
use warden::cli::Args;
use warden::config::WardenConfig;
use warden::observability::init_observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_observability();
    let config = WardenConfig::from_env_or_yaml()?;
    if let Err(err) = warden::run(&args, &config).await {
        tracing::error!(error = ?err, "reconciliation failed");
        return Err(err);
    }
    Ok(())
}
