//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs`, `std::process`, or `std::net`. All error types
//! implement `thiserror::Error` and convert to `anyhow::Error` via the `?`
//! operator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Failure taxonomy ──────────────────────────────────────────────────────────

/// How a terminal failure should be treated by the authority and operators.
///
/// Attached to failure reports so the upstream side never has to guess the
/// retry semantics from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retried on the next poll tick without operator involvement.
    Transient,
    /// Not retryable until an operator changes something on the node.
    FatalConfiguration,
    /// Content verification failed; remaining sources were exhausted.
    Integrity,
    /// A previously satisfied state is no longer detected.
    Drift,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to agent configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("authority_url must start with http:// or https://, got '{0}'")]
    InvalidAuthorityUrl(String),

    #[error("node_id is empty. Register this node before starting the agent.")]
    MissingNodeId,

    #[error("api_token is empty. Register this node before starting the agent.")]
    MissingApiToken,

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

// ── Acquisition errors ────────────────────────────────────────────────────────

/// Errors related to artifact acquisition and the content-addressed cache.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no download sources declared for '{artifact}'")]
    NoSources { artifact: String },

    #[error("all {tried} sources failed for '{artifact}'; last error: {last}")]
    AllSourcesFailed {
        artifact: String,
        tried: usize,
        last: String,
        /// Whether any source produced content failing checksum verification.
        integrity: bool,
    },
}

impl AcquisitionError {
    /// Retry semantics of this acquisition failure.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NoSources { .. } => FailureKind::FatalConfiguration,
            Self::AllSourcesFailed { integrity: true, .. } => FailureKind::Integrity,
            Self::AllSourcesFailed { .. } => FailureKind::Transient,
        }
    }
}

// ── Execution errors ──────────────────────────────────────────────────────────

/// Errors related to command execution pre-flight checks.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(
        "'{program}' requires elevated privileges but the agent is not running elevated. \
         Change the agent's run-as identity and re-deploy."
    )]
    PrivilegesRequired { program: String },
}
