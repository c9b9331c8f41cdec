//! Steward node agent - drives managed endpoints toward fleet-declared state

use clap::Parser;
use tracing_subscriber::EnvFilter;

use steward_agent::cli::Cli;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("STEWARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
