//! Command execution domain types and the exit-code taxonomy.
//!
//! Classification is a data-driven lookup keyed on installer technology and
//! exit code. It is never inferred from captured output text.

use serde::{Deserialize, Serialize};

use crate::domain::error::FailureKind;

/// Placeholder replaced with the acquired artifact's local path in command
/// argument lists.
pub const ARTIFACT_PLACEHOLDER: &str = "{file}";

/// Byte budget for each captured output stream in upstream reports.
/// Full output stays in the local log.
pub const MAX_REPORT_OUTPUT_BYTES: usize = 8 * 1024;

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Installer technology of a package artifact. Drives the exit-code table
/// and the structural elevation requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerTech {
    Msi,
    Exe,
    Script,
}

impl InstallerTech {
    /// Whether this technology structurally requires elevated rights,
    /// independent of any explicit flag on the command.
    #[must_use]
    pub const fn requires_elevation(self) -> bool {
        matches!(self, Self::Msi | Self::Exe)
    }
}

/// A command template from the authority: program, argument list (possibly
/// containing `{file}`), and execution constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Explicit elevation requirement on top of the structural one.
    #[serde(default)]
    pub requires_admin: bool,
    /// Per-command timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    /// Whether running this command under `tech` needs elevated rights.
    #[must_use]
    pub const fn needs_elevation(&self, tech: InstallerTech) -> bool {
        self.requires_admin || tech.requires_elevation()
    }

    /// Argument list with `{file}` substituted by the artifact path.
    #[must_use]
    pub fn resolved_args(&self, artifact_path: Option<&str>) -> Vec<String> {
        self.args
            .iter()
            .map(|a| match artifact_path {
                Some(p) => a.replace(ARTIFACT_PLACEHOLDER, p),
                None => a.clone(),
            })
            .collect()
    }
}

/// Classification of a completed (or pre-flight-rejected) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCodeClass {
    Success,
    SuccessRebootRequired,
    /// Another installer operation holds the machine; retry on a later tick.
    TransientFailure,
    /// Missing privileges; retrying cannot succeed until an operator acts.
    FatalPrivilege,
    GenericFailure,
}

impl ExitCodeClass {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessRebootRequired)
    }

    /// Retry semantics attached to failure reports. `None` for successes and
    /// for generic failures, whose retry is the poll loop's natural re-fetch.
    #[must_use]
    pub const fn failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::TransientFailure => Some(FailureKind::Transient),
            Self::FatalPrivilege => Some(FailureKind::FatalConfiguration),
            Self::Success | Self::SuccessRebootRequired | Self::GenericFailure => None,
        }
    }
}

/// Outcome of one command execution: raw exit code, its classification, and
/// the captured streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `None` when the process never ran (pre-flight rejection) or was
    /// terminated by a signal.
    pub exit_code: Option<i32>,
    pub classification: ExitCodeClass,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Result representing a pre-flight privilege rejection. No process ran.
    #[must_use]
    pub fn privilege_rejection(detail: String) -> Self {
        Self {
            exit_code: None,
            classification: ExitCodeClass::FatalPrivilege,
            stdout: String::new(),
            stderr: detail,
        }
    }

    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.classification.is_success()
    }

    #[must_use]
    pub const fn requires_reboot(&self) -> bool {
        matches!(self.classification, ExitCodeClass::SuccessRebootRequired)
    }
}

// ── Exit-code tables ──────────────────────────────────────────────────────────

/// Installer exit codes with a meaning beyond plain success/failure.
///
/// These are the platform installer's documented magic numbers; keeping them
/// as data makes the mapping testable and extensible per technology.
const INSTALLER_EXIT_CODES: &[(i32, ExitCodeClass)] = &[
    (0, ExitCodeClass::Success),
    // Operation completed, reboot needed to finish.
    (3010, ExitCodeClass::SuccessRebootRequired),
    // Another install/uninstall already in progress.
    (1618, ExitCodeClass::TransientFailure),
    // Access denied / insufficient privileges.
    (5, ExitCodeClass::FatalPrivilege),
    (740, ExitCodeClass::FatalPrivilege),
    (1925, ExitCodeClass::FatalPrivilege),
];

/// Classify `exit_code` for the given installer technology.
///
/// Scripts have no magic numbers: zero is success, anything else a generic
/// failure. Signal termination (`None`) is always a generic failure.
#[must_use]
pub fn classify_exit_code(tech: InstallerTech, exit_code: Option<i32>) -> ExitCodeClass {
    let Some(code) = exit_code else {
        return ExitCodeClass::GenericFailure;
    };
    match tech {
        InstallerTech::Script => {
            if code == 0 {
                ExitCodeClass::Success
            } else {
                ExitCodeClass::GenericFailure
            }
        }
        InstallerTech::Msi | InstallerTech::Exe => INSTALLER_EXIT_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map_or(ExitCodeClass::GenericFailure, |(_, class)| *class),
    }
}

/// Truncate captured output to [`MAX_REPORT_OUTPUT_BYTES`] for upstream
/// reports, appending a marker when anything was dropped.
#[must_use]
pub fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_REPORT_OUTPUT_BYTES {
        return output.to_string();
    }
    let mut end = MAX_REPORT_OUTPUT_BYTES;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = output[..end].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

// ── Unit tests ────────────────────────────────────────────────────────────────
