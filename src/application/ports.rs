//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::detection::DetectionRule;
use crate::domain::health::{HealthCheck, HealthReport};
use crate::domain::task::{
    ArtifactSpec, AssignmentStatusReport, DeploymentStatusReport, DownloadSource, JobStatusReport,
    OneOffJob, PackageDeployment, PackageRef, ServiceAssignment,
};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program with the instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Authority Port ────────────────────────────────────────────────────────────

/// The pull/report/metadata contract with the central authority.
#[allow(async_fn_in_trait)]
pub trait Authority {
    /// Fetch pending one-off jobs for this node.
    async fn fetch_jobs(&self) -> Result<Vec<OneOffJob>>;
    /// Fetch pending package deployments for this node.
    async fn fetch_deployments(&self) -> Result<Vec<PackageDeployment>>;
    /// Fetch current service assignments for this node.
    async fn fetch_assignments(&self) -> Result<Vec<ServiceAssignment>>;

    /// Resolve artifact metadata (filename, checksum, sources, commands).
    async fn artifact_spec(&self, package: &PackageRef) -> Result<ArtifactSpec>;
    /// Resolve the detection rule set for a package/version.
    async fn detection_rules(&self, package: &PackageRef) -> Result<Vec<DetectionRule>>;

    /// Post a job status. Best-effort; callers log failures and move on.
    async fn report_job(&self, job_id: &str, report: &JobStatusReport) -> Result<()>;
    /// Post a deployment status.
    async fn report_deployment(
        &self,
        deployment_id: &str,
        report: &DeploymentStatusReport,
    ) -> Result<()>;
    /// Post a per-assignment status.
    async fn report_assignment(
        &self,
        assignment_id: &str,
        report: &AssignmentStatusReport,
    ) -> Result<()>;
}

// ── Machine State Port ────────────────────────────────────────────────────────

/// Read-only queries against local machine state, used by the Detection
/// Engine. Implementations must not mutate anything.
#[allow(async_fn_in_trait)]
pub trait SystemInspector {
    /// Installed version of a package id, or `None` when not installed.
    async fn package_version(&self, id: &str) -> Result<Option<String>>;
    /// Value stored in the node-local configuration store, or `None`.
    async fn config_value(&self, path: &str, value_name: Option<&str>) -> Result<Option<String>>;
    /// Whether a file exists at `path`.
    async fn file_exists(&self, path: &str) -> Result<bool>;
    /// Version metadata for the file, when the platform exposes any.
    async fn file_version(&self, path: &str) -> Result<Option<semver::Version>>;
    /// Whether a unit is registered with the service manager.
    async fn service_registered(&self, name: &str) -> Result<bool>;
}

// ── Artifact Store Port ───────────────────────────────────────────────────────

/// Outcome of committing a downloaded file into the content-addressed cache.
#[derive(Debug)]
pub enum CommitOutcome {
    /// Verified and atomically moved into the cache.
    Committed(PathBuf),
    /// Content hash did not match; the temp file has been deleted.
    ChecksumMismatch { actual: String },
}

/// The content-addressed artifact cache.
#[allow(async_fn_in_trait)]
pub trait ArtifactStore {
    /// Allocate a unique staging path on the cache filesystem, so the final
    /// commit is an atomic rename.
    async fn stage(&self) -> Result<PathBuf>;
    /// Look up a verified entry by expected checksum. Re-verifies content on
    /// every hit; a corrupt entry is deleted and `None` returned.
    async fn lookup(&self, sha256: &str) -> Result<Option<PathBuf>>;
    /// Verify `staged` against `expected_sha256` and move it into the cache.
    async fn commit(
        &self,
        staged: &Path,
        expected_sha256: &str,
        filename: &str,
    ) -> Result<CommitOutcome>;
}

// ── Artifact Fetcher Port ─────────────────────────────────────────────────────

/// Downloads one source to a local destination, reporting progress and
/// observing cancellation. Returns the number of bytes written.
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    async fn download(&self, source: &DownloadSource, dest: &Path) -> Result<u64>;
}

// ── Health Probe Port ─────────────────────────────────────────────────────────

/// Runs one data-driven health check. Probe failures fold into an
/// `Unhealthy` report rather than erroring.
#[allow(async_fn_in_trait)]
pub trait HealthProbe {
    async fn probe(&self, check: &HealthCheck) -> HealthReport;
}

// ── Privilege Probe Port ──────────────────────────────────────────────────────

/// Reports whether the agent process currently holds elevated rights.
/// Read-only; used by the execution pre-flight check.
#[allow(async_fn_in_trait)]
pub trait PrivilegeProbe {
    async fn is_elevated(&self) -> bool;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit byte-level transfer progress. `total` is `None` when the source
    /// did not declare a size.
    fn progress(&self, bytes: u64, total: Option<u64>);
}

// ── Service Config Writer Port ────────────────────────────────────────────────

/// Writes rendered service configuration files to the node's local
/// configuration area. Writes must be atomic (temp file + rename).
#[allow(async_fn_in_trait)]
pub trait ServiceConfigWriter {
    /// Write `contents` for `service` under `filename`; returns the path.
    async fn write_rendered(
        &self,
        service: &str,
        filename: &str,
        contents: &str,
    ) -> Result<PathBuf>;
}
