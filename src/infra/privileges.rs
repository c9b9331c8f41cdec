//! Privilege probe implementation.
//!
//! Elevation is queried through the platform's identity tool rather than a
//! syscall so the check stays portable and free of unsafe code. A probe that
//! cannot determine the answer reports "not elevated" — the resulting fatal
//! pre-flight error is actionable, a misreported generic install failure is
//! not.

use crate::application::ports::{CommandRunner, PrivilegeProbe};

/// Production privilege probe over a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct OsPrivilegeProbe<R> {
    runner: R,
}

impl<R: CommandRunner> OsPrivilegeProbe<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> PrivilegeProbe for OsPrivilegeProbe<R> {
    async fn is_elevated(&self) -> bool {
        match self.runner.run("id", &["-u"]).await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() == "0"
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::process::Output;
    use std::time::Duration;

    use anyhow::Result;

    use super::*;
    use crate::application::services::test_support::ok_output;

    struct RunnerStub(Option<Output>);
    impl CommandRunner for RunnerStub {
        async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
            self.run_with_timeout(program, args, Duration::from_secs(1))
                .await
        }
        async fn run_with_timeout(&self, _: &str, _: &[&str], _: Duration) -> Result<Output> {
            match &self.0 {
                Some(output) => Ok(Output {
                    status: output.status,
                    stdout: output.stdout.clone(),
                    stderr: output.stderr.clone(),
                }),
                None => anyhow::bail!("id: command not found"),
            }
        }
    }

    #[tokio::test]
    async fn uid_zero_is_elevated() {
        let probe = OsPrivilegeProbe::new(RunnerStub(Some(ok_output(b"0\n"))));
        assert!(probe.is_elevated().await);
    }

    #[tokio::test]
    async fn nonzero_uid_is_not_elevated() {
        let probe = OsPrivilegeProbe::new(RunnerStub(Some(ok_output(b"1000\n"))));
        assert!(!probe.is_elevated().await);
    }

    #[tokio::test]
    async fn probe_failure_is_conservatively_not_elevated() {
        let probe = OsPrivilegeProbe::new(RunnerStub(None));
        assert!(!probe.is_elevated().await);
    }
}
