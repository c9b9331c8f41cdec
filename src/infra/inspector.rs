//! OS-backed implementation of the `SystemInspector` port.
//!
//! Every query is read-only: package state comes from the platform package
//! registry's query tools, config state from on-disk files, service state
//! from the service manager's status commands.

use anyhow::Result;

use crate::application::ports::{CommandRunner, SystemInspector};

/// Read-only machine state queries over a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct OsSystemInspector<R> {
    runner: R,
}

impl<R: CommandRunner> OsSystemInspector<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run a registry query; a missing tool or non-zero exit is "not found",
    /// never an error — detection treats inaccessible state as a clean false.
    async fn query(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.runner.run(program, args).await {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!stdout.is_empty()).then_some(stdout)
            }
            _ => None,
        }
    }
}

impl<R: CommandRunner> SystemInspector for OsSystemInspector<R> {
    async fn package_version(&self, id: &str) -> Result<Option<String>> {
        // dpkg first, rpm second; whichever registry knows the id wins.
        if let Some(version) = self
            .query("dpkg-query", &["-W", "-f", "${Version}", id])
            .await
        {
            return Ok(Some(version));
        }
        Ok(self.query("rpm", &["-q", "--qf", "%{VERSION}", id]).await)
    }

    async fn config_value(&self, path: &str, value_name: Option<&str>) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(_) => return Ok(None),
        };
        let Some(name) = value_name else {
            return Ok(Some(content.trim().to_string()));
        };
        // `key = value` / `key: value` lines, first match wins.
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            for sep in ['=', ':'] {
                if let Some((key, value)) = line.split_once(sep)
                    && key.trim() == name
                {
                    return Ok(Some(value.trim().to_string()));
                }
            }
        }
        Ok(None)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }

    async fn file_version(&self, path: &str) -> Result<Option<semver::Version>> {
        // There is no portable version resource on a file. Vendors that ship
        // a `<file>.version` manifest get version-aware detection; everything
        // else reports no metadata and the rule decides.
        let sidecar = format!("{path}.version");
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(content) => Ok(semver::Version::parse(content.trim()).ok()),
            Err(_) => Ok(None),
        }
    }

    async fn service_registered(&self, name: &str) -> Result<bool> {
        Ok(self
            .runner
            .run("systemctl", &["cat", "--", name])
            .await
            .map(|output| output.status.success())
            .unwrap_or(false))
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
