//! Task descriptors and status report payloads.
//!
//! All task data originates upstream and is fetched by polling; the agent
//! never creates tasks, only consumes them and reports on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::FailureKind;
use crate::domain::exec::{CommandSpec, InstallerTech};
use crate::domain::health::{HealthCheck, HealthStatus};

// ── One-off jobs ──────────────────────────────────────────────────────────────

/// Status of a one-off job as tracked by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// An ad-hoc command assigned to this node. Not retried by the agent; the
/// authority re-assigns if it wants another attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneOffJob {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub status: JobStatus,
}

/// Terminal (or transitional) status report for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

// ── Package deployments ───────────────────────────────────────────────────────

/// What the authority wants done with a package on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    /// Install unconditionally (within the maintenance window, if any).
    Required,
    /// Offered for self-service; the agent takes no action.
    Available,
    /// Remove if present.
    Uninstall,
}

/// Hour-of-day window during which a deployment may act.
/// A window wrapping midnight (e.g. 22–04) is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl MaintenanceWindow {
    /// Whether `hour` (0–23) falls inside the window.
    /// The start hour is inclusive, the end hour exclusive.
    #[must_use]
    pub const fn contains(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// A named package at a pinned version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A desired install/uninstall/available action for a package on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDeployment {
    pub id: String,
    pub package: PackageRef,
    pub mode: DeployMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<MaintenanceWindow>,
}

/// Deployment lifecycle status as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Downloading,
    Installing,
    Success,
    Failed,
    Skipped,
}

/// Status report for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusReport {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl DeploymentStatusReport {
    #[must_use]
    pub const fn of(status: DeploymentStatus) -> Self {
        Self {
            status,
            exit_code: None,
            error: None,
            error_kind: None,
        }
    }

    #[must_use]
    pub fn failed(error: String, kind: FailureKind, exit_code: Option<i32>) -> Self {
        Self {
            status: DeploymentStatus::Failed,
            exit_code,
            error: Some(error),
            error_kind: Some(kind),
        }
    }

    #[must_use]
    pub fn skipped(reason: String) -> Self {
        Self {
            status: DeploymentStatus::Skipped,
            exit_code: None,
            error: Some(reason),
            error_kind: None,
        }
    }
}

// ── Artifact metadata ─────────────────────────────────────────────────────────

/// An acquisition candidate for a package artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSource {
    pub kind: SourceKind,
    pub url: String,
    /// Lower value is tried first.
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Share,
    Http,
}

/// Artifact metadata resolved from the authority for a package/version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub filename: String,
    /// Lowercase hex SHA-256 of the artifact content.
    pub sha256: String,
    pub size_bytes: u64,
    pub technology: InstallerTech,
    pub install: CommandSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<CommandSpec>,
    pub sources: Vec<DownloadSource>,
}

impl ArtifactSpec {
    /// Sources ordered by ascending priority value.
    #[must_use]
    pub fn sources_by_priority(&self) -> Vec<&DownloadSource> {
        let mut ordered: Vec<&DownloadSource> = self.sources.iter().collect();
        ordered.sort_by_key(|s| s.priority);
        ordered
    }
}

// ── Service assignments ───────────────────────────────────────────────────────

/// How to treat a previously satisfied assignment whose environment changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    Ignore,
    Warn,
    Strict,
}

/// Key/value-substituted configuration file attached to an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTemplate {
    /// File name under the node's service configuration area.
    pub filename: String,
    pub template: String,
    #[serde(default)]
    pub values: std::collections::BTreeMap<String, String>,
}

/// A long-lived binding between this node and a declared service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAssignment {
    pub id: String,
    pub service: String,
    pub service_class: String,
    /// Monotonically increasing, set by the authority.
    pub desired_state_version: u64,
    /// Last version this node successfully reconciled to.
    pub current_state_version: u64,
    #[serde(default)]
    pub required_packages: Vec<PackageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_template: Option<ConfigTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    pub drift_policy: DriftPolicy,
}

impl ServiceAssignment {
    /// Whether the desired version is ahead of what this node applied.
    #[must_use]
    pub const fn needs_reconcile(&self) -> bool {
        self.current_state_version < self.desired_state_version
    }
}

/// Reconciliation status of an assignment as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    InSync,
    Reconciling,
    Failed,
    Drifted,
}

/// Per-assignment status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentStatusReport {
    pub status: AssignmentStatus,
    pub health: HealthStatus,
    /// Present only when reconciliation advanced the applied version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub reported_at: DateTime<Utc>,
}

// ── Unit tests ────────────────────────────────────────────────────────────────
