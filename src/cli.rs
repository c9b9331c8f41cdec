//! Command-line interface for `stewardd`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app;
use crate::infra::config::ConfigStore;

#[derive(Parser)]
#[command(
    name = "stewardd",
    version,
    about = "Steward node agent - drives this endpoint toward fleet-declared state"
)]
pub struct Cli {
    /// Path to the agent configuration file (default: ~/.steward/agent.yaml).
    #[arg(long, global = true, env = "STEWARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent poll cycles until interrupted (default).
    Run,
    /// Validate the configuration file and print the effective settings.
    CheckConfig,
    /// Print the agent version.
    Version,
}

impl Cli {
    /// # Errors
    ///
    /// Returns an error if the selected command fails.
    pub async fn run(self) -> Result<()> {
        match self.command.unwrap_or(Commands::Run) {
            Commands::Run => app::run(self.config).await,
            Commands::CheckConfig => check_config(self.config),
            Commands::Version => {
                println!("stewardd {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

fn config_store(path: Option<PathBuf>) -> Result<ConfigStore> {
    match path {
        Some(path) => Ok(ConfigStore::with_path(path)),
        None => ConfigStore::new(),
    }
}

fn check_config(path: Option<PathBuf>) -> Result<()> {
    let store = config_store(path)?;
    let loaded = store.load_validated()?;
    println!("config file:  {}", store.path().display());
    println!("authority:    {}", loaded.authority_url);
    println!("node id:      {}", loaded.node_id);
    println!(
        "api token:    {}",
        if loaded.api_token.is_empty() {
            "(unset)"
        } else {
            "(set)"
        }
    );
    println!(
        "poll:         jobs {}s, deployments {}s, assignments {}s",
        loaded.poll.jobs_interval_secs,
        loaded.poll.deployments_interval_secs,
        loaded.poll.assignments_interval_secs
    );
    println!(
        "drift check:  every {} assignment ticks",
        loaded.poll.drift_check_every
    );
    println!("cache cap:    {} bytes", loaded.cache.max_bytes);
    Ok(())
}

// ── Unit tests ────────────────────────────────────────────────────────────────
