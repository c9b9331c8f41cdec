//! HTTP implementation of the `Authority` port.
//!
//! Every request carries the node's static bearer credential. Non-2xx
//! responses surface as errors so the poll loops can apply their backoff.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::application::ports::Authority;
use crate::domain::config::AgentConfig;
use crate::domain::detection::DetectionRule;
use crate::domain::task::{
    ArtifactSpec, AssignmentStatusReport, DeploymentStatusReport, JobStatusReport, OneOffJob,
    PackageDeployment, PackageRef, ServiceAssignment,
};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Authority client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    base: String,
    node_id: String,
}

impl HttpAuthority {
    /// # Errors
    ///
    /// Returns an error if the credential is not a valid header value or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .context("api_token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .user_agent(concat!("steward-agent/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building authority HTTP client")?;

        Ok(Self {
            client,
            base: config.authority_url.trim_end_matches('/').to_string(),
            node_id: config.node_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .json()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?;
        Ok(())
    }
}

impl Authority for HttpAuthority {
    async fn fetch_jobs(&self) -> Result<Vec<OneOffJob>> {
        self.get_json(&format!("nodes/{}/jobs", self.node_id)).await
    }

    async fn fetch_deployments(&self) -> Result<Vec<PackageDeployment>> {
        self.get_json(&format!("nodes/{}/deployments", self.node_id))
            .await
    }

    async fn fetch_assignments(&self) -> Result<Vec<ServiceAssignment>> {
        self.get_json(&format!("nodes/{}/assignments", self.node_id))
            .await
    }

    async fn artifact_spec(&self, package: &PackageRef) -> Result<ArtifactSpec> {
        self.get_json(&format!(
            "packages/{}/{}/artifact",
            package.name, package.version
        ))
        .await
    }

    async fn detection_rules(&self, package: &PackageRef) -> Result<Vec<DetectionRule>> {
        self.get_json(&format!(
            "packages/{}/{}/rules",
            package.name, package.version
        ))
        .await
    }

    async fn report_job(&self, job_id: &str, report: &JobStatusReport) -> Result<()> {
        self.post_json(&format!("jobs/{job_id}/status"), report)
            .await
    }

    async fn report_deployment(
        &self,
        deployment_id: &str,
        report: &DeploymentStatusReport,
    ) -> Result<()> {
        self.post_json(&format!("deployments/{deployment_id}/status"), report)
            .await
    }

    async fn report_assignment(
        &self,
        assignment_id: &str,
        report: &AssignmentStatusReport,
    ) -> Result<()> {
        self.post_json(&format!("assignments/{assignment_id}/status"), report)
            .await
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
