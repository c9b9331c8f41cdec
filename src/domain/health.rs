//! Health check descriptors and results.
//!
//! The check kind is data-driven from the assignment descriptor. All kinds
//! are side-effect-free and carry a timeout.

use serde::{Deserialize, Serialize};

fn default_timeout_secs() -> u64 {
    10
}

/// A declarative health check attached to a service assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCheck {
    /// HTTP GET returns a 2xx status.
    Http {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// A TCP connection to the port succeeds.
    Tcp {
        host: String,
        port: u16,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// An OS process with this name is present.
    Process {
        name: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// The service manager reports the unit as running.
    Service {
        name: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl HealthCheck {
    #[must_use]
    pub const fn timeout_secs(&self) -> u64 {
        match self {
            Self::Http { timeout_secs, .. }
            | Self::Tcp { timeout_secs, .. }
            | Self::Process { timeout_secs, .. }
            | Self::Service { timeout_secs, .. } => *timeout_secs,
        }
    }

    /// Short label for logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Http { url, .. } => format!("http {url}"),
            Self::Tcp { host, port, .. } => format!("tcp {host}:{port}"),
            Self::Process { name, .. } => format!("process {name}"),
            Self::Service { name, .. } => format!("service {name}"),
        }
    }
}

/// Result of running a health check (or of not having one to run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// No health check declared for the assignment.
    Unknown,
}

/// A health status plus the probe's explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub detail: String,
}

impl HealthReport {
    #[must_use]
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}
