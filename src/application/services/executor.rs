//! Execution engine: run one installer/uninstaller/script to completion.
//!
//! No retries here — retry policy belongs to the caller. The engine owns the
//! pre-flight privilege check and the exit-code classification.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, PrivilegeProbe};
use crate::domain::exec::{CommandSpec, ExecutionResult, InstallerTech, classify_exit_code};

/// Run `spec` to completion, substituting `{file}` with `artifact_path`.
///
/// When the action structurally requires elevated rights and the agent does
/// not hold them, returns a `FatalPrivilege` result without spawning anything
/// — misreporting that as a generic failure would send operators chasing the
/// wrong cause.
///
/// # Errors
///
/// Returns an error only when the process cannot be spawned or exceeds its
/// timeout; a process that ran and exited is always an `Ok` result carrying
/// its classification.
pub async fn run_command(
    runner: &impl CommandRunner,
    privileges: &impl PrivilegeProbe,
    spec: &CommandSpec,
    tech: InstallerTech,
    artifact_path: Option<&Path>,
    default_timeout: Duration,
) -> Result<ExecutionResult> {
    if spec.needs_elevation(tech) && !privileges.is_elevated().await {
        let err = crate::domain::error::ExecError::PrivilegesRequired {
            program: spec.program.clone(),
        };
        return Ok(ExecutionResult::privilege_rejection(err.to_string()));
    }

    let artifact = artifact_path.map(|p| p.to_string_lossy().into_owned());
    let args = spec.resolved_args(artifact.as_deref());
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let timeout = spec
        .timeout_secs
        .map_or(default_timeout, Duration::from_secs);

    let output = runner
        .run_with_timeout(&spec.program, &arg_refs, timeout)
        .await
        .with_context(|| format!("running {}", spec.program))?;

    let exit_code = output.status.code();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    // Reports upstream carry truncated output; the full streams stay here.
    tracing::debug!(
        program = %spec.program,
        ?exit_code,
        %stdout,
        %stderr,
        "command finished"
    );
    Ok(ExecutionResult {
        exit_code,
        classification: classify_exit_code(tech, exit_code),
        stdout,
        stderr,
    })
}

// ── Unit tests ────────────────────────────────────────────────────────────────
