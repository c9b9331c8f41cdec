//! Health probe implementations for the four check kinds.
//!
//! Probes are side-effect-free and fold every failure into an `Unhealthy`
//! report with a detail string; they never error out of the reconcile path.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, HealthProbe};
use crate::domain::health::{HealthCheck, HealthReport};

/// Production health prober.
#[derive(Clone)]
pub struct HealthProber<R> {
    client: reqwest::Client,
    runner: R,
}

impl<R: CommandRunner> HealthProber<R> {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(runner: R) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("steward-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building health probe HTTP client")?;
        Ok(Self { client, runner })
    }

    async fn probe_http(&self, url: &str, timeout: Duration) -> HealthReport {
        let request = self.client.get(url).timeout(timeout).send();
        match request.await {
            Ok(response) if response.status().is_success() => {
                HealthReport::healthy(format!("HTTP {} from {url}", response.status()))
            }
            Ok(response) => {
                HealthReport::unhealthy(format!("HTTP {} from {url}", response.status()))
            }
            Err(e) => HealthReport::unhealthy(format!("GET {url}: {e}")),
        }
    }

    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> HealthReport {
        let addr = format!("{host}:{port}");
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => HealthReport::healthy(format!("connected to {addr}")),
            Ok(Err(e)) => HealthReport::unhealthy(format!("connect {addr}: {e}")),
            Err(_) => HealthReport::unhealthy(format!(
                "connect {addr}: timed out after {}s",
                timeout.as_secs()
            )),
        }
    }

    async fn probe_process(&self, name: &str, timeout: Duration) -> HealthReport {
        match self
            .runner
            .run_with_timeout("pgrep", &["-x", "--", name], timeout)
            .await
        {
            Ok(output) if output.status.success() => {
                HealthReport::healthy(format!("process '{name}' present"))
            }
            Ok(_) => HealthReport::unhealthy(format!("process '{name}' not found")),
            Err(e) => HealthReport::unhealthy(format!("process check for '{name}': {e:#}")),
        }
    }

    async fn probe_service(&self, name: &str, timeout: Duration) -> HealthReport {
        match self
            .runner
            .run_with_timeout("systemctl", &["is-active", "--quiet", "--", name], timeout)
            .await
        {
            Ok(output) if output.status.success() => {
                HealthReport::healthy(format!("service '{name}' running"))
            }
            Ok(_) => HealthReport::unhealthy(format!("service '{name}' not running")),
            Err(e) => HealthReport::unhealthy(format!("service check for '{name}': {e:#}")),
        }
    }
}

impl<R: CommandRunner> HealthProbe for HealthProber<R> {
    async fn probe(&self, check: &HealthCheck) -> HealthReport {
        let timeout = Duration::from_secs(check.timeout_secs());
        match check {
            HealthCheck::Http { url, .. } => self.probe_http(url, timeout).await,
            HealthCheck::Tcp { host, port, .. } => self.probe_tcp(host, *port, timeout).await,
            HealthCheck::Process { name, .. } => self.probe_process(name, timeout).await,
            HealthCheck::Service { name, .. } => self.probe_service(name, timeout).await,
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
