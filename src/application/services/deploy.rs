//! Deployment handling: one desired install/uninstall/available action.
//!
//! Intermediate statuses (downloading, installing) are posted best-effort
//! while the work runs; the final status is returned to the poller, which
//! owns terminal reporting.

use std::time::Duration;

use crate::application::ports::{
    ArtifactFetcher, ArtifactStore, Authority, CommandRunner, PrivilegeProbe, ProgressReporter,
    SystemInspector,
};
use crate::application::services::{acquisition, detection, executor};
use crate::domain::error::{AcquisitionError, FailureKind};
use crate::domain::exec::truncate_output;
use crate::domain::task::{
    DeployMode, DeploymentStatus, DeploymentStatusReport, PackageDeployment,
};

/// Handle one deployment descriptor and return its final status report.
#[allow(clippy::too_many_arguments)] // one seam per engine, wired once by the poller
pub async fn handle_deployment(
    deployment: &PackageDeployment,
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    reporter: &impl ProgressReporter,
    default_timeout: Duration,
    current_hour: u8,
) -> DeploymentStatusReport {
    if let Some(window) = &deployment.window
        && !window.contains(current_hour)
    {
        return DeploymentStatusReport::skipped(format!(
            "outside maintenance window {:02}-{:02}",
            window.start_hour, window.end_hour
        ));
    }

    if deployment.mode == DeployMode::Available {
        return DeploymentStatusReport::skipped(
            "available mode; installation is user-initiated".to_string(),
        );
    }

    let rules = match authority.detection_rules(&deployment.package).await {
        Ok(rules) => rules,
        Err(e) => {
            return DeploymentStatusReport::failed(
                format!("fetching detection rules: {e:#}"),
                FailureKind::Transient,
                None,
            );
        }
    };
    let detected = detection::evaluate(inspector, &rules).await;

    match deployment.mode {
        DeployMode::Required => {
            if detected.installed {
                reporter.step(&format!(
                    "{} already installed; nothing to do",
                    deployment.package
                ));
                return DeploymentStatusReport::of(DeploymentStatus::Success);
            }
            install(
                deployment, authority, store, fetcher, runner, privileges, reporter,
                default_timeout,
            )
            .await
        }
        DeployMode::Uninstall => {
            if !detected.installed {
                return DeploymentStatusReport::skipped("not installed".to_string());
            }
            uninstall(deployment, authority, runner, privileges, default_timeout).await
        }
        DeployMode::Available => unreachable!("handled above"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn install(
    deployment: &PackageDeployment,
    authority: &impl Authority,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    reporter: &impl ProgressReporter,
    default_timeout: Duration,
) -> DeploymentStatusReport {
    let artifact = match authority.artifact_spec(&deployment.package).await {
        Ok(spec) => spec,
        Err(e) => {
            return DeploymentStatusReport::failed(
                format!("resolving artifact: {e:#}"),
                FailureKind::Transient,
                None,
            );
        }
    };

    report_progress(authority, reporter, &deployment.id, DeploymentStatus::Downloading).await;
    let path = match acquisition::acquire(store, fetcher, reporter, &artifact).await {
        Ok(path) => path,
        Err(e) => {
            let kind = e
                .downcast_ref::<AcquisitionError>()
                .map_or(FailureKind::Transient, AcquisitionError::failure_kind);
            return DeploymentStatusReport::failed(format!("{e:#}"), kind, None);
        }
    };

    report_progress(authority, reporter, &deployment.id, DeploymentStatus::Installing).await;
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
            return DeploymentStatusReport::failed(
                format!("running installer: {e:#}"),
                FailureKind::Transient,
                None,
            );
        }
    };

    if result.succeeded() {
        if result.requires_reboot() {
            reporter.warn(&format!(
                "{} installed; a reboot is required to finish",
                deployment.package
            ));
        }
        DeploymentStatusReport {
            status: DeploymentStatus::Success,
            exit_code: result.exit_code,
            error: None,
            error_kind: None,
        }
    } else {
        DeploymentStatusReport::failed(
            format!(
                "installer failed ({:?}): {}",
                result.classification,
                truncate_output(&result.stderr)
            ),
            result
                .classification
                .failure_kind()
                .unwrap_or(FailureKind::Transient),
            result.exit_code,
        )
    }
}

async fn uninstall(
    deployment: &PackageDeployment,
    authority: &impl Authority,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    default_timeout: Duration,
) -> DeploymentStatusReport {
    let artifact = match authority.artifact_spec(&deployment.package).await {
        Ok(spec) => spec,
        Err(e) => {
            return DeploymentStatusReport::failed(
                format!("resolving artifact: {e:#}"),
                FailureKind::Transient,
                None,
            );
        }
    };
    let Some(spec) = &artifact.uninstall else {
        return DeploymentStatusReport::failed(
            format!("no uninstall command declared for {}", deployment.package),
            FailureKind::FatalConfiguration,
            None,
        );
    };

    let result = match executor::run_command(
        runner,
        privileges,
        spec,
        artifact.technology,
        None,
        default_timeout,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            return DeploymentStatusReport::failed(
                format!("running uninstaller: {e:#}"),
                FailureKind::Transient,
                None,
            );
        }
    };

    if result.succeeded() {
        DeploymentStatusReport {
            status: DeploymentStatus::Success,
            exit_code: result.exit_code,
            error: None,
            error_kind: None,
        }
    } else {
        DeploymentStatusReport::failed(
            format!(
                "uninstaller failed ({:?}): {}",
                result.classification,
                truncate_output(&result.stderr)
            ),
            result
                .classification
                .failure_kind()
                .unwrap_or(FailureKind::Transient),
            result.exit_code,
        )
    }
}

/// Post an intermediate status; a failed post is logged, never fatal.
async fn report_progress(
    authority: &impl Authority,
    reporter: &impl ProgressReporter,
    deployment_id: &str,
    status: DeploymentStatus,
) {
    let report = DeploymentStatusReport::of(status);
    if let Err(e) = authority.report_deployment(deployment_id, &report).await {
        reporter.warn(&format!(
            "status report for deployment {deployment_id} failed: {e:#}"
        ));
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use anyhow::Result;

    use super::*;
    use crate::application::ports::CommitOutcome;
    use crate::application::services::test_support::{exit_status, RecordingReporter};
    use crate::domain::detection::DetectionRule;
    use crate::domain::exec::{CommandSpec, InstallerTech};
    use crate::domain::task::{
        ArtifactSpec, AssignmentStatusReport, DownloadSource, JobStatusReport, MaintenanceWindow,
        OneOffJob, PackageRef, ServiceAssignment, SourceKind,
    };

    const TIMEOUT: Duration = Duration::from_secs(60);

    struct AuthoritySpy {
        with_uninstall: bool,
        progress: Mutex<Vec<DeploymentStatus>>,
    }

    impl AuthoritySpy {
        fn new(with_uninstall: bool) -> Self {
            Self {
                with_uninstall,
                progress: Mutex::new(Vec::new()),
            }
        }
    }

    impl Authority for AuthoritySpy {
        async fn fetch_jobs(&self) -> Result<Vec<OneOffJob>> {
            anyhow::bail!("not expected")
        }
        async fn fetch_deployments(&self) -> Result<Vec<PackageDeployment>> {
            anyhow::bail!("not expected")
        }
        async fn fetch_assignments(&self) -> Result<Vec<ServiceAssignment>> {
            anyhow::bail!("not expected")
        }
        async fn artifact_spec(&self, package: &PackageRef) -> Result<ArtifactSpec> {
            Ok(ArtifactSpec {
                filename: format!("{}.msi", package.name),
                sha256: "cafe".to_string(),
                size_bytes: 16,
                technology: InstallerTech::Script,
                install: CommandSpec {
                    program: "install".to_string(),
                    args: vec!["{file}".to_string()],
                    requires_admin: false,
                    timeout_secs: None,
                },
                uninstall: self.with_uninstall.then(|| CommandSpec {
                    program: "uninstall".to_string(),
                    args: vec![],
                    requires_admin: false,
                    timeout_secs: None,
                }),
                sources: vec![DownloadSource {
                    kind: SourceKind::Http,
                    url: "https://depot/pkg".to_string(),
                    priority: 1,
                }],
            })
        }
        async fn detection_rules(&self, package: &PackageRef) -> Result<Vec<DetectionRule>> {
            Ok(vec![DetectionRule::Package {
                id: package.name.clone(),
            }])
        }
        async fn report_job(&self, _: &str, _: &JobStatusReport) -> Result<()> {
            anyhow::bail!("not expected")
        }
        async fn report_deployment(&self, _: &str, report: &DeploymentStatusReport) -> Result<()> {
            self.progress.lock().expect("lock").push(report.status);
            Ok(())
        }
        async fn report_assignment(&self, _: &str, _: &AssignmentStatusReport) -> Result<()> {
            anyhow::bail!("not expected")
        }
    }

    struct InspectorStub {
        installed: HashSet<String>,
    }
    impl InspectorStub {
        fn with(installed: &[&str]) -> Self {
            Self {
                installed: installed.iter().map(ToString::to_string).collect(),
            }
        }
    }
    impl SystemInspector for InspectorStub {
        async fn package_version(&self, id: &str) -> Result<Option<String>> {
            Ok(self.installed.contains(id).then(|| "1.0.0".to_string()))
        }
        async fn config_value(&self, _: &str, _: Option<&str>) -> Result<Option<String>> {
            Ok(None)
        }
        async fn file_exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn file_version(&self, _: &str) -> Result<Option<semver::Version>> {
            Ok(None)
        }
        async fn service_registered(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    struct StoreStub;
    impl ArtifactStore for StoreStub {
        async fn stage(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("/stage/x.part"))
        }
        async fn lookup(&self, _: &str) -> Result<Option<PathBuf>> {
            Ok(None)
        }
        async fn commit(&self, _: &Path, sha: &str, filename: &str) -> Result<CommitOutcome> {
            Ok(CommitOutcome::Committed(PathBuf::from(format!(
                "/cache/{sha}/{filename}"
            ))))
        }
    }

    struct FetcherStub;
    impl ArtifactFetcher for FetcherStub {
        async fn download(&self, _: &DownloadSource, _: &Path) -> Result<u64> {
            Ok(16)
        }
    }

    struct RunnerSpy {
        exit_code: i32,
        programs: Mutex<Vec<String>>,
    }
    impl RunnerSpy {
        fn with_exit(exit_code: i32) -> Self {
            Self {
                exit_code,
                programs: Mutex::new(Vec::new()),
            }
        }
    }
    impl CommandRunner for RunnerSpy {
        async fn run(&self, program: &str, args: &[&str]) -> Result<std::process::Output> {
            self.run_with_timeout(program, args, TIMEOUT).await
        }
        async fn run_with_timeout(
            &self,
            program: &str,
            _args: &[&str],
            _timeout: Duration,
        ) -> Result<std::process::Output> {
            self.programs.lock().expect("lock").push(program.to_string());
            Ok(std::process::Output {
                status: exit_status(self.exit_code),
                stdout: Vec::new(),
                stderr: b"installer error".to_vec(),
            })
        }
    }

    struct Elevated;
    impl PrivilegeProbe for Elevated {
        async fn is_elevated(&self) -> bool {
            true
        }
    }

    fn deployment(mode: DeployMode) -> PackageDeployment {
        PackageDeployment {
            id: "dep-1".to_string(),
            package: PackageRef {
                name: "relay".to_string(),
                version: "2.0.0".to_string(),
            },
            mode,
            window: None,
        }
    }

    async fn run(
        dep: &PackageDeployment,
        authority: &AuthoritySpy,
        inspector: &InspectorStub,
        runner: &RunnerSpy,
        hour: u8,
    ) -> DeploymentStatusReport {
        handle_deployment(
            dep,
            authority,
            inspector,
            &StoreStub,
            &FetcherStub,
            runner,
            &Elevated,
            &RecordingReporter::default(),
            TIMEOUT,
            hour,
        )
        .await
    }

    #[tokio::test]
    async fn outside_window_is_skipped_with_window_named() {
        let mut dep = deployment(DeployMode::Required);
        dep.window = Some(MaintenanceWindow {
            start_hour: 22,
            end_hour: 4,
        });
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &dep,
            &AuthoritySpy::new(false),
            &InspectorStub::with(&[]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Skipped);
        assert!(report.error.expect("reason").contains("22-04"));
        assert!(runner.programs.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn inside_wrapping_window_proceeds() {
        let mut dep = deployment(DeployMode::Required);
        dep.window = Some(MaintenanceWindow {
            start_hour: 22,
            end_hour: 4,
        });
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &dep,
            &AuthoritySpy::new(false),
            &InspectorStub::with(&[]),
            &runner,
            23,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Success);
    }

    #[tokio::test]
    async fn available_mode_takes_no_action() {
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Available),
            &AuthoritySpy::new(false),
            &InspectorStub::with(&[]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Skipped);
        assert!(runner.programs.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn required_already_installed_reports_success_without_running() {
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Required),
            &AuthoritySpy::new(false),
            &InspectorStub::with(&["relay"]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Success);
        assert!(runner.programs.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn required_install_posts_intermediate_statuses_in_order() {
        let authority = AuthoritySpy::new(false);
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Required),
            &authority,
            &InspectorStub::with(&[]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Success);
        assert_eq!(
            *authority.progress.lock().expect("lock"),
            vec![DeploymentStatus::Downloading, DeploymentStatus::Installing]
        );
    }

    #[tokio::test]
    async fn failed_install_carries_classification_detail_and_exit_code() {
        let runner = RunnerSpy::with_exit(7);
        let report = run(
            &deployment(DeployMode::Required),
            &AuthoritySpy::new(false),
            &InspectorStub::with(&[]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Failed);
        assert_eq!(report.exit_code, Some(7));
        let error = report.error.expect("error");
        assert!(error.contains("installer error"), "got: {error}");
    }

    #[tokio::test]
    async fn uninstall_of_absent_package_is_skipped() {
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Uninstall),
            &AuthoritySpy::new(true),
            &InspectorStub::with(&[]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Skipped);
        assert!(runner.programs.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn uninstall_of_present_package_runs_uninstaller() {
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Uninstall),
            &AuthoritySpy::new(true),
            &InspectorStub::with(&["relay"]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Success);
        assert_eq!(*runner.programs.lock().expect("lock"), vec!["uninstall"]);
    }

    #[tokio::test]
    async fn uninstall_without_declared_command_is_fatal_configuration() {
        let runner = RunnerSpy::with_exit(0);
        let report = run(
            &deployment(DeployMode::Uninstall),
            &AuthoritySpy::new(false),
            &InspectorStub::with(&["relay"]),
            &runner,
            12,
        )
        .await;
        assert_eq!(report.status, DeploymentStatus::Failed);
        assert_eq!(report.error_kind, Some(FailureKind::FatalConfiguration));
    }
}
