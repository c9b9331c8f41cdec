//! Agent configuration schema and validators.
//!
//! Pure functions only — no I/O, no async, no filesystem access. Loading
//! lives in `crate::infra::config`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Defaults ──────────────────────────────────────────────────────────────────

fn default_jobs_interval() -> u64 {
    60
}
fn default_deployments_interval() -> u64 {
    300
}
fn default_assignments_interval() -> u64 {
    300
}
fn default_readiness_poll() -> u64 {
    5
}
fn default_max_backoff() -> u64 {
    900
}
fn default_drift_check_every() -> u32 {
    5
}
fn default_command_timeout() -> u64 {
    3600
}
fn default_cache_max_bytes() -> u64 {
    4 * 1024 * 1024 * 1024
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.steward/agent.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the authority, e.g. `https://steward.corp.example`.
    pub authority_url: String,
    /// Identity assigned to this node at registration time.
    pub node_id: String,
    /// Static credential attached to every authority call.
    pub api_token: String,
    pub poll: PollConfig,
    pub cache: CacheConfig,
    /// Default timeout for install/uninstall subprocesses, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Directory rendered service configuration files are written to.
    /// Defaults to `<agent dir>/services` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_config_dir: Option<PathBuf>,
}

/// Poll cadence and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    #[serde(default = "default_jobs_interval")]
    pub jobs_interval_secs: u64,
    #[serde(default = "default_deployments_interval")]
    pub deployments_interval_secs: u64,
    #[serde(default = "default_assignments_interval")]
    pub assignments_interval_secs: u64,
    /// Cadence of the readiness gate before the main loops start.
    #[serde(default = "default_readiness_poll")]
    pub readiness_poll_secs: u64,
    /// Ceiling for the per-cycle error backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    /// Drift/health verification runs every Nth assignment tick.
    #[serde(default = "default_drift_check_every")]
    pub drift_check_every: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            jobs_interval_secs: default_jobs_interval(),
            deployments_interval_secs: default_deployments_interval(),
            assignments_interval_secs: default_assignments_interval(),
            readiness_poll_secs: default_readiness_poll(),
            max_backoff_secs: default_max_backoff(),
            drift_check_every: default_drift_check_every(),
        }
    }
}

/// Artifact cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root. Defaults to `<agent dir>/cache` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Size cap enforced by LRU eviction after each insert.
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: default_cache_max_bytes(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            authority_url: String::new(),
            node_id: String::new(),
            api_token: String::new(),
            poll: PollConfig::default(),
            cache: CacheConfig::default(),
            command_timeout_secs: default_command_timeout(),
            service_config_dir: None,
        }
    }
}

impl AgentConfig {
    /// Whether this node has been registered with the authority.
    /// The poller's readiness gate blocks until this is true.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.node_id.trim().is_empty() && !self.api_token.trim().is_empty()
    }
}

// ── Validators ────────────────────────────────────────────────────────────────

/// Validate a loaded configuration.
///
/// # Errors
///
/// Returns an error naming the first invalid field.
pub fn validate(config: &AgentConfig) -> Result<()> {
    if !config.authority_url.starts_with("http://") && !config.authority_url.starts_with("https://")
    {
        return Err(ConfigError::InvalidAuthorityUrl(config.authority_url.clone()).into());
    }
    if config.node_id.trim().is_empty() {
        return Err(ConfigError::MissingNodeId.into());
    }
    if config.api_token.trim().is_empty() {
        return Err(ConfigError::MissingApiToken.into());
    }
    for (field, value) in [
        ("poll.jobs_interval_secs", config.poll.jobs_interval_secs),
        (
            "poll.deployments_interval_secs",
            config.poll.deployments_interval_secs,
        ),
        (
            "poll.assignments_interval_secs",
            config.poll.assignments_interval_secs,
        ),
        ("poll.readiness_poll_secs", config.poll.readiness_poll_secs),
        ("command_timeout_secs", config.command_timeout_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::ZeroInterval { field }.into());
        }
    }
    if config.poll.drift_check_every == 0 {
        return Err(ConfigError::ZeroInterval {
            field: "poll.drift_check_every",
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ────────────────────────────────────────────────────────────────
