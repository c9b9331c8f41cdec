//! Task poller: three independent timer-driven cycles with error backoff.
//!
//! Cycles never block each other; they share only the artifact cache and the
//! configuration snapshot. A cycle that hits an unexpected error (network
//! down, malformed response) backs off to a longer interval and resumes its
//! normal cadence on the first successful tick.

use std::time::Duration;

use anyhow::Result;
use chrono::Timelike;
use tokio::sync::watch;

use crate::application::ports::{
    ArtifactFetcher, ArtifactStore, Authority, CommandRunner, HealthProbe, PrivilegeProbe,
    ProgressReporter, ServiceConfigWriter, SystemInspector,
};
use crate::application::services::{deploy, executor, reconcile};
use crate::domain::exec::{CommandSpec, InstallerTech, truncate_output};
use crate::domain::task::{JobStatus, JobStatusReport};

// ── Cycle loop ────────────────────────────────────────────────────────────────

/// Timing parameters for one poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub name: &'static str,
    pub interval: Duration,
    pub max_backoff: Duration,
}

/// Delay before the next tick after `failures` consecutive errors.
/// Doubles per failure, capped at `max_backoff`.
#[must_use]
pub fn backoff_delay(interval: Duration, failures: u32, max_backoff: Duration) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 2u32.saturating_pow(failures.min(5));
    interval.saturating_mul(factor).min(max_backoff)
}

/// Run `tick` on a fixed cadence until shutdown is requested.
///
/// The tick counter starts at 1 and is passed through so callers can key
/// slower cadences (drift verification) off it.
pub async fn run_cycle<F, Fut>(
    settings: CycleSettings,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut failures: u32 = 0;
    let mut tick_no: u64 = 0;
    loop {
        if *shutdown.borrow() {
            tracing::info!(cycle = settings.name, "shutdown requested; cycle stopping");
            return;
        }
        tick_no += 1;
        match tick(tick_no).await {
            Ok(()) => {
                failures = 0;
                tracing::debug!(cycle = settings.name, tick = tick_no, "tick complete");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    cycle = settings.name,
                    tick = tick_no,
                    consecutive_failures = failures,
                    "tick failed; backing off: {e:#}"
                );
            }
        }
        let delay = backoff_delay(settings.interval, failures, settings.max_backoff);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }
}

// ── Tick handlers ─────────────────────────────────────────────────────────────

/// One jobs-cycle tick: fetch pending one-off jobs and run each in the order
/// the authority returned them.
pub async fn jobs_tick(
    authority: &impl Authority,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    reporter: &impl ProgressReporter,
    shutdown: &watch::Receiver<bool>,
    default_timeout: Duration,
) -> Result<()> {
    let jobs = authority.fetch_jobs().await?;
    for job in jobs {
        if *shutdown.borrow() {
            return Ok(());
        }
        if job.status == JobStatus::Cancelled {
            // The authority withdrew the job between polls; acknowledge it
            // without executing anything.
            report_job(authority, reporter, &job.id, &JobStatusReport {
                status: JobStatus::Cancelled,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
            })
            .await;
            continue;
        }

        report_job(authority, reporter, &job.id, &JobStatusReport {
            status: JobStatus::Running,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        })
        .await;

        let spec = CommandSpec {
            program: job.command.clone(),
            args: job.args.clone(),
            requires_admin: false,
            timeout_secs: job.timeout_secs,
        };
        let outcome = executor::run_command(
            runner,
            privileges,
            &spec,
            InstallerTech::Script,
            None,
            default_timeout,
        )
        .await;

        // A result produced while shutdown was requested must not be reported.
        if *shutdown.borrow() {
            return Ok(());
        }

        let report = match outcome {
            Ok(result) => JobStatusReport {
                status: if result.succeeded() {
                    JobStatus::Success
                } else {
                    JobStatus::Failed
                },
                exit_code: result.exit_code,
                stdout: truncate_output(&result.stdout),
                stderr: truncate_output(&result.stderr),
            },
            Err(e) => JobStatusReport {
                status: JobStatus::Failed,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("{e:#}"),
            },
        };
        report_job(authority, reporter, &job.id, &report).await;
    }
    Ok(())
}

/// One deployments-cycle tick.
#[allow(clippy::too_many_arguments)] // one seam per engine, wired once at startup
pub async fn deployments_tick(
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    reporter: &impl ProgressReporter,
    shutdown: &watch::Receiver<bool>,
    default_timeout: Duration,
) -> Result<()> {
    let deployments = authority.fetch_deployments().await?;
    let hour = local_hour();
    for deployment in deployments {
        if *shutdown.borrow() {
            return Ok(());
        }
        let report = deploy::handle_deployment(
            &deployment,
            authority,
            inspector,
            store,
            fetcher,
            runner,
            privileges,
            reporter,
            default_timeout,
            hour,
        )
        .await;
        if *shutdown.borrow() {
            return Ok(());
        }
        if let Err(e) = authority.report_deployment(&deployment.id, &report).await {
            reporter.warn(&format!(
                "status report for deployment {} failed: {e:#}",
                deployment.id
            ));
        }
    }
    Ok(())
}

/// One assignments-cycle tick. Every `drift_check_every`-th tick also runs
/// the slower drift/health verification for in-sync assignments.
#[allow(clippy::too_many_arguments)] // one seam per engine, wired once at startup
pub async fn assignments_tick(
    authority: &impl Authority,
    inspector: &impl SystemInspector,
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    health: &impl HealthProbe,
    writer: &impl ServiceConfigWriter,
    reporter: &impl ProgressReporter,
    shutdown: &watch::Receiver<bool>,
    default_timeout: Duration,
    tick_no: u64,
    drift_check_every: u32,
) -> Result<()> {
    let assignments = authority.fetch_assignments().await?;
    let drift_tick = tick_no % u64::from(drift_check_every.max(1)) == 0;
    for assignment in assignments {
        if *shutdown.borrow() {
            return Ok(());
        }
        let report = reconcile::reconcile_assignment(
            &assignment,
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
            drift_tick,
        )
        .await;
        if *shutdown.borrow() {
            return Ok(());
        }
        if let Err(e) = authority.report_assignment(&assignment.id, &report).await {
            reporter.warn(&format!(
                "status report for assignment {} failed: {e:#}",
                assignment.id
            ));
        }
    }
    Ok(())
}

fn local_hour() -> u8 {
    #[allow(clippy::cast_possible_truncation)]
    {
        chrono::Local::now().hour() as u8
    }
}

async fn report_job(
    authority: &impl Authority,
    reporter: &impl ProgressReporter,
    job_id: &str,
    report: &JobStatusReport,
) {
    if let Err(e) = authority.report_job(job_id, report).await {
        reporter.warn(&format!("status report for job {job_id} failed: {e:#}"));
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::Result;

    use super::*;
    use crate::application::services::test_support::{exit_status, RecordingReporter};
    use crate::domain::detection::DetectionRule;
    use crate::domain::task::{
        ArtifactSpec, AssignmentStatusReport, DeploymentStatusReport, OneOffJob,
        PackageDeployment, PackageRef, ServiceAssignment,
    };

    // ── backoff_delay ────────────────────────────────────────────────────────

    #[test]
    fn test_backoff_no_failures_keeps_interval() {
        let d = backoff_delay(Duration::from_secs(60), 0, Duration::from_secs(900));
        assert_eq!(d, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_doubles_per_failure() {
        let interval = Duration::from_secs(60);
        let max = Duration::from_secs(900);
        assert_eq!(backoff_delay(interval, 1, max), Duration::from_secs(120));
        assert_eq!(backoff_delay(interval, 2, max), Duration::from_secs(240));
        assert_eq!(backoff_delay(interval, 3, max), Duration::from_secs(480));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let d = backoff_delay(Duration::from_secs(60), 10, Duration::from_secs(900));
        assert_eq!(d, Duration::from_secs(900));
    }

    // ── run_cycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn run_cycle_stops_on_shutdown_and_counts_ticks() {
        let (tx, rx) = watch::channel(false);
        let ticks = AtomicU32::new(0);
        let settings = CycleSettings {
            name: "test",
            interval: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        };
        run_cycle(settings, rx, |_n| {
            let count = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= 3 {
                let _ = tx.send(true);
            }
            async { Ok(()) }
        })
        .await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_cycle_resumes_after_errors() {
        let (tx, rx) = watch::channel(false);
        let ticks = AtomicU32::new(0);
        let settings = CycleSettings {
            name: "test",
            interval: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        run_cycle(settings, rx, |n| {
            let count = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= 4 {
                let _ = tx.send(true);
            }
            async move {
                // First two ticks fail; the loop must keep going.
                if n <= 2 {
                    anyhow::bail!("transient")
                }
                Ok(())
            }
        })
        .await;
        assert!(ticks.load(Ordering::SeqCst) >= 4);
    }

    // ── jobs_tick ────────────────────────────────────────────────────────────

    struct JobAuthority {
        jobs: Vec<OneOffJob>,
        reports: Mutex<Vec<(String, JobStatus)>>,
    }

    impl JobAuthority {
        fn new(jobs: Vec<OneOffJob>) -> Self {
            Self {
                jobs,
                reports: Mutex::new(Vec::new()),
            }
        }
        fn statuses(&self) -> Vec<JobStatus> {
            self.reports
                .lock()
                .expect("lock")
                .iter()
                .map(|(_, s)| *s)
                .collect()
        }
    }

    impl Authority for JobAuthority {
        async fn fetch_jobs(&self) -> Result<Vec<OneOffJob>> {
            Ok(self.jobs.clone())
        }
        async fn fetch_deployments(&self) -> Result<Vec<PackageDeployment>> {
            Ok(vec![])
        }
        async fn fetch_assignments(&self) -> Result<Vec<ServiceAssignment>> {
            Ok(vec![])
        }
        async fn artifact_spec(&self, _: &PackageRef) -> Result<ArtifactSpec> {
            anyhow::bail!("not expected")
        }
        async fn detection_rules(&self, _: &PackageRef) -> Result<Vec<DetectionRule>> {
            anyhow::bail!("not expected")
        }
        async fn report_job(&self, job_id: &str, report: &JobStatusReport) -> Result<()> {
            self.reports
                .lock()
                .expect("lock")
                .push((job_id.to_string(), report.status));
            Ok(())
        }
        async fn report_deployment(&self, _: &str, _: &DeploymentStatusReport) -> Result<()> {
            Ok(())
        }
        async fn report_assignment(&self, _: &str, _: &AssignmentStatusReport) -> Result<()> {
            Ok(())
        }
    }

    struct RunnerStub(i32);
    impl CommandRunner for RunnerStub {
        async fn run(&self, program: &str, args: &[&str]) -> Result<std::process::Output> {
            self.run_with_timeout(program, args, Duration::from_secs(1))
                .await
        }
        async fn run_with_timeout(
            &self,
            _: &str,
            _: &[&str],
            _: Duration,
        ) -> Result<std::process::Output> {
            Ok(std::process::Output {
                status: exit_status(self.0),
                stdout: b"done".to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    struct Elevated;
    impl PrivilegeProbe for Elevated {
        async fn is_elevated(&self) -> bool {
            true
        }
    }

    fn job(id: &str, status: JobStatus) -> OneOffJob {
        OneOffJob {
            id: id.to_string(),
            command: "/usr/local/bin/task".to_string(),
            args: vec![],
            timeout_secs: Some(5),
            status,
        }
    }

    #[tokio::test]
    async fn jobs_tick_reports_running_then_terminal_status() {
        let authority = JobAuthority::new(vec![job("job-1", JobStatus::Pending)]);
        let (_tx, rx) = watch::channel(false);
        jobs_tick(
            &authority,
            &RunnerStub(0),
            &Elevated,
            &RecordingReporter::default(),
            &rx,
            Duration::from_secs(5),
        )
        .await
        .expect("tick");
        assert_eq!(
            authority.statuses(),
            vec![JobStatus::Running, JobStatus::Success]
        );
    }

    #[tokio::test]
    async fn jobs_tick_failed_command_reports_failed() {
        let authority = JobAuthority::new(vec![job("job-1", JobStatus::Pending)]);
        let (_tx, rx) = watch::channel(false);
        jobs_tick(
            &authority,
            &RunnerStub(2),
            &Elevated,
            &RecordingReporter::default(),
            &rx,
            Duration::from_secs(5),
        )
        .await
        .expect("tick");
        assert_eq!(
            authority.statuses(),
            vec![JobStatus::Running, JobStatus::Failed]
        );
    }

    #[tokio::test]
    async fn jobs_tick_acknowledges_cancelled_job_without_running_it() {
        let authority = JobAuthority::new(vec![job("job-1", JobStatus::Cancelled)]);
        let (_tx, rx) = watch::channel(false);
        jobs_tick(
            &authority,
            &RunnerStub(0),
            &Elevated,
            &RecordingReporter::default(),
            &rx,
            Duration::from_secs(5),
        )
        .await
        .expect("tick");
        assert_eq!(authority.statuses(), vec![JobStatus::Cancelled]);
    }

    #[tokio::test]
    async fn jobs_tick_processes_jobs_in_authority_order() {
        let authority = JobAuthority::new(vec![
            job("job-a", JobStatus::Pending),
            job("job-b", JobStatus::Pending),
        ]);
        let (_tx, rx) = watch::channel(false);
        jobs_tick(
            &authority,
            &RunnerStub(0),
            &Elevated,
            &RecordingReporter::default(),
            &rx,
            Duration::from_secs(5),
        )
        .await
        .expect("tick");
        let ids: Vec<String> = authority
            .reports
            .lock()
            .expect("lock")
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(ids, vec!["job-a", "job-a", "job-b", "job-b"]);
    }

    #[tokio::test]
    async fn jobs_tick_does_not_report_after_shutdown() {
        let authority = JobAuthority::new(vec![job("job-1", JobStatus::Pending)]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("send");
        jobs_tick(
            &authority,
            &RunnerStub(0),
            &Elevated,
            &RecordingReporter::default(),
            &rx,
            Duration::from_secs(5),
        )
        .await
        .expect("tick");
        assert!(authority.statuses().is_empty(), "no report after shutdown");
    }
}
