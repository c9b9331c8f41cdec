//! Configuration loading and the local service-config writer.
//!
//! The agent directory defaults to `~/.steward/`; the config file is
//! `agent.yaml` inside it. Rendered service configuration is written
//! atomically (temp file + rename) to prevent half-written files.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::application::ports::ServiceConfigWriter;
use crate::domain::config::{self, AgentConfig};

const CONFIG_FILENAME: &str = "agent.yaml";

/// Returns `~/.steward`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn agent_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".steward"))
}

/// Loads the agent configuration and gates startup on registration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store reading the default path (`~/.steward/agent.yaml`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(agent_dir()?.join(CONFIG_FILENAME)))
    }

    /// Store reading an explicit path (used by `--config` and tests).
    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the configuration without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or unparsable.
    pub fn load(&self) -> Result<AgentConfig> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading config file {}", self.path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", self.path.display()))
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparsable, or
    /// fails validation.
    pub fn load_validated(&self) -> Result<AgentConfig> {
        let loaded = self.load()?;
        config::validate(&loaded)?;
        Ok(loaded)
    }

    /// Poll the config file until it parses and reports a registered node.
    ///
    /// Returns `None` when shutdown was requested while waiting. This is the
    /// readiness gate: a missing or invalid local config pauses the agent
    /// until an operator (or the bootstrap flow) restores it.
    pub async fn wait_until_registered(
        &self,
        mut shutdown: watch::Receiver<bool>,
        poll: Duration,
    ) -> Option<AgentConfig> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            let delay = match self.load() {
                Ok(loaded) if loaded.is_registered() && config::validate(&loaded).is_ok() => {
                    return Some(loaded);
                }
                Ok(loaded) => {
                    tracing::info!(
                        path = %self.path.display(),
                        "config present but node not registered yet; waiting"
                    );
                    Duration::from_secs(loaded.poll.readiness_poll_secs)
                }
                Err(e) => {
                    tracing::info!(
                        path = %self.path.display(),
                        "agent not configured yet; waiting: {e:#}"
                    );
                    poll
                }
            };
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

// ── Service config writer ─────────────────────────────────────────────────────

/// Writes rendered service configuration under `<dir>/<service>/<filename>`.
#[derive(Debug, Clone)]
pub struct LocalServiceConfigWriter {
    dir: PathBuf,
}

impl LocalServiceConfigWriter {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ServiceConfigWriter for LocalServiceConfigWriter {
    async fn write_rendered(
        &self,
        service: &str,
        filename: &str,
        contents: &str,
    ) -> Result<PathBuf> {
        let dir = self.dir.join(service);
        let path = dir.join(filename);
        let contents = contents.to_string();
        let final_path = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
            let temp = path.with_extension("tmp");
            std::fs::write(&temp, contents)
                .with_context(|| format!("writing temp file {}", temp.display()))?;
            std::fs::rename(&temp, &path)
                .with_context(|| format!("finalizing config file {}", path.display()))?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("config write task panicked")??;
        Ok(final_path)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
