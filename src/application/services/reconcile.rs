//! Reconciliation: drive one service assignment toward its desired version.
//!
//! The applied version only advances after every required package passes
//! detection and the declared health check (if any) passes. Package failures
//! are fail-fast: the remaining packages wait for the next poll tick, where
//! detection makes the retry incremental rather than a full redo.

use std::time::Duration;

use chrono::Utc;

use crate::application::ports::{
    ArtifactFetcher, ArtifactStore, Authority, CommandRunner, HealthProbe, PrivilegeProbe,
    ProgressReporter, ServiceConfigWriter, SystemInspector,
};
use crate::application::services::{acquisition, detection, executor};
use crate::domain::error::{AcquisitionError, FailureKind};
use crate::domain::health::{HealthReport, HealthStatus};
use crate::domain::task::{
    AssignmentStatus, AssignmentStatusReport, DriftPolicy, PackageRef, ServiceAssignment,
};

// ── Package installation step ─────────────────────────────────────────────────

/// Outcome of ensuring one package is installed.
#[derive(Debug)]
pub enum PackageStepOutcome {
    /// Detection already reported the package present; nothing ran.
    AlreadyPresent,
    Installed {
        reboot_required: bool,
    },
    Failed {
        error: String,
        kind: Option<FailureKind>,
        exit_code: Option<i32>,
    },
}

impl PackageStepOutcome {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::AlreadyPresent | Self::Installed { .. })
    }
}

/// Ensure `package` is installed: detect, acquire, execute, classify.
#[allow(clippy::too_many_arguments)] // one seam per engine, wired once by the poller
pub async fn ensure_package_installed(
    package: &PackageRef,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    reporter: &impl ProgressReporter,
    default_timeout: Duration,
) -> PackageStepOutcome {
    let rules = match authority.detection_rules(package).await {
        Ok(rules) => rules,
        Err(e) => {
            return PackageStepOutcome::Failed {
                error: format!("fetching detection rules for {package}: {e:#}"),
                kind: Some(FailureKind::Transient),
                exit_code: None,
            };
        }
    };

    let outcome = detection::evaluate(inspector, &rules).await;
    if outcome.installed {
        reporter.step(&format!("{package} already installed; skipping"));
        return PackageStepOutcome::AlreadyPresent;
    }

    let artifact = match authority.artifact_spec(package).await {
        Ok(spec) => spec,
        Err(e) => {
            return PackageStepOutcome::Failed {
                error: format!("resolving artifact for {package}: {e:#}"),
                kind: Some(FailureKind::Transient),
                exit_code: None,
            };
        }
    };

    let path = match acquisition::acquire(store, fetcher, reporter, &artifact).await {
        Ok(path) => path,
        Err(e) => {
            let kind = e
                .downcast_ref::<AcquisitionError>()
                .map(AcquisitionError::failure_kind);
            return PackageStepOutcome::Failed {
                error: format!("acquiring {package}: {e:#}"),
                kind,
                exit_code: None,
            };
        }
    };

    let result = match executor::run_command(
        runner,
        privileges,
        &artifact.install,
        artifact.technology,
        Some(&path),
        default_timeout,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            return PackageStepOutcome::Failed {
                error: format!("installing {package}: {e:#}"),
                kind: Some(FailureKind::Transient),
                exit_code: None,
            };
        }
    };

    if result.succeeded() {
        reporter.success(&format!("installed {package}"));
        PackageStepOutcome::Installed {
            reboot_required: result.requires_reboot(),
        }
    } else {
        PackageStepOutcome::Failed {
            error: format!(
                "install command for {package} failed ({:?}, exit {:?}): {}",
                result.classification,
                result.exit_code,
                crate::domain::exec::truncate_output(&result.stderr)
            ),
            kind: result.classification.failure_kind(),
            exit_code: result.exit_code,
        }
    }
}

// ── Assignment reconciliation ─────────────────────────────────────────────────

fn report(
    status: AssignmentStatus,
    health: HealthStatus,
    state_version: Option<u64>,
    error: Option<String>,
    error_kind: Option<FailureKind>,
) -> AssignmentStatusReport {
    AssignmentStatusReport {
        status,
        health,
        state_version,
        error,
        error_kind,
        reported_at: Utc::now(),
    }
}

/// Reconcile one assignment and produce its status report.
///
/// `drift_tick` marks the slower verification cadence: on those ticks an
/// in-sync assignment gets its health re-checked and, under a non-ignore
/// drift policy, its required packages re-detected. On ordinary ticks an
/// in-sync assignment is left alone.
#[allow(clippy::too_many_arguments)] // one seam per engine, wired once by the poller
pub async fn reconcile_assignment(
    assignment: &ServiceAssignment,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    health: &impl HealthProbe,
    writer: &impl ServiceConfigWriter,
    reporter: &impl ProgressReporter,
    default_timeout: Duration,
    drift_tick: bool,
) -> AssignmentStatusReport {
    if assignment.needs_reconcile() {
        reconcile_to_desired(
            assignment,
            authority,
            inspector,
            store,
            fetcher,
            runner,
            privileges,
            health,
            writer,
            reporter,
            default_timeout,
        )
        .await
    } else if drift_tick {
        verify_in_sync(assignment, authority, inspector, health, reporter).await
    } else {
        report(
            AssignmentStatus::InSync,
            HealthStatus::Unknown,
            None,
            None,
            None,
        )
    }
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_to_desired(
    assignment: &ServiceAssignment,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    health: &impl HealthProbe,
    writer: &impl ServiceConfigWriter,
    reporter: &impl ProgressReporter,
    default_timeout: Duration,
) -> AssignmentStatusReport {
    reporter.step(&format!(
        "reconciling {} from version {} to {}",
        assignment.service, assignment.current_state_version, assignment.desired_state_version
    ));

    // Fail-fast: the first failing package stops this cycle. Detection makes
    // the next attempt incremental.
    for package in &assignment.required_packages {
        let step = ensure_package_installed(
            package, authority, inspector, store, fetcher, runner, privileges, reporter,
            default_timeout,
        )
        .await;
        if let PackageStepOutcome::Failed {
            error,
            kind,
            exit_code: _,
        } = step
        {
            return report(
                AssignmentStatus::Failed,
                HealthStatus::Unknown,
                None,
                Some(error),
                kind,
            );
        }
    }

    if let Some(template) = &assignment.config_template {
        let rendered = crate::domain::template::render(&template.template, &template.values);
        for name in &rendered.unknown {
            reporter.warn(&format!(
                "config template for {}: placeholder '{{{name}}}' has no declared value",
                assignment.service
            ));
        }
        if let Err(e) = writer
            .write_rendered(&assignment.service, &template.filename, &rendered.contents)
            .await
        {
            return report(
                AssignmentStatus::Failed,
                HealthStatus::Unknown,
                None,
                Some(format!(
                    "writing configuration for {}: {e:#}",
                    assignment.service
                )),
                Some(FailureKind::Transient),
            );
        }
    }

    let health_report = match &assignment.health_check {
        Some(check) => health.probe(check).await,
        None => HealthReport {
            status: HealthStatus::Unknown,
            detail: "no health check declared".to_string(),
        },
    };

    if health_report.status == HealthStatus::Unhealthy {
        // Everything installed but the service is not healthy: stay at the
        // old version and say so with a health-specific error.
        return report(
            AssignmentStatus::Reconciling,
            HealthStatus::Unhealthy,
            None,
            Some(format!(
                "health check failed after package installation: {}",
                health_report.detail
            )),
            None,
        );
    }

    reporter.success(&format!(
        "{} reconciled to version {}",
        assignment.service, assignment.desired_state_version
    ));
    report(
        AssignmentStatus::InSync,
        health_report.status,
        Some(assignment.desired_state_version),
        None,
        None,
    )
}

async fn verify_in_sync(
    assignment: &ServiceAssignment,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    health: &impl HealthProbe,
    reporter: &impl ProgressReporter,
) -> AssignmentStatusReport {
    if assignment.drift_policy != DriftPolicy::Ignore {
        match missing_packages(assignment, authority, inspector).await {
            Err(e) => {
                // Never report drift off the back of an unreachable authority.
                reporter.warn(&format!(
                    "drift check for {} skipped: {e:#}",
                    assignment.service
                ));
            }
            Ok(missing) if !missing.is_empty() => {
                let detail = format!(
                    "previously installed packages no longer detected: {}",
                    missing.join(", ")
                );
                match assignment.drift_policy {
                    DriftPolicy::Strict => {
                        return report(
                            AssignmentStatus::Drifted,
                            HealthStatus::Unhealthy,
                            None,
                            Some(detail),
                            Some(FailureKind::Drift),
                        );
                    }
                    DriftPolicy::Warn => {
                        reporter.warn(&format!("{}: {detail}", assignment.service));
                    }
                    DriftPolicy::Ignore => {}
                }
            }
            Ok(_) => {}
        }
    }

    let health_report = match &assignment.health_check {
        Some(check) => health.probe(check).await,
        None => HealthReport {
            status: HealthStatus::Unknown,
            detail: String::new(),
        },
    };
    let error = (health_report.status == HealthStatus::Unhealthy)
        .then(|| format!("health check failed: {}", health_report.detail));
    report(
        AssignmentStatus::InSync,
        health_report.status,
        None,
        error,
        None,
    )
}

/// Required packages whose detection rules no longer pass.
async fn missing_packages(
    assignment: &ServiceAssignment,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
) -> anyhow::Result<Vec<String>> {
    let mut missing = Vec::new();
    for package in &assignment.required_packages {
        let rules = authority.detection_rules(package).await?;
        let outcome = detection::evaluate(inspector, &rules).await;
        if !outcome.installed {
            missing.push(package.name.clone());
        }
    }
    Ok(missing)
}

// ── Unit tests ────────────────────────────────────────────────────────────────
