use anyhow::Result;
use binary_deployer::cli::{run, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("binary-deployer starting, environment loaded");

    let cli = Cli::parse();
    tracing::debug!("Arguments parsed");
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("binary-deployer finished"),
        Err(e) => tracing::error!(error = %e, "binary-deployer failed"),
    }
    result
}
