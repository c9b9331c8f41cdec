//! Source download implementation of the `ArtifactFetcher` port.
//!
//! `http` sources stream over HTTP(S); `share` sources copy from a mounted
//! depot path. Both report incremental progress and observe the shutdown
//! signal between chunks so an in-flight transfer unwinds promptly.

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::application::ports::{ArtifactFetcher, ProgressReporter};
use crate::domain::task::{DownloadSource, SourceKind};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Production fetcher for both source kinds.
#[derive(Clone)]
pub struct SourceDownloader<P> {
    client: reqwest::Client,
    reporter: P,
    shutdown: watch::Receiver<bool>,
}

impl<P: ProgressReporter> SourceDownloader<P> {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(reporter: P, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("steward-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(15))
            .build()
            .context("building download HTTP client")?;
        Ok(Self {
            client,
            reporter,
            shutdown,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        anyhow::ensure!(!*self.shutdown.borrow(), "shutdown requested; download aborted");
        Ok(())
    }

    async fn download_http(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            self.check_cancelled()?;
            let chunk = chunk.context("download interrupted")?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
            written += chunk.len() as u64;
            self.reporter.progress(written, total);
        }
        file.flush().await.context("flushing download")?;
        Ok(written)
    }

    async fn copy_from_share(&self, source_path: &str, dest: &Path) -> Result<u64> {
        let total = tokio::fs::metadata(source_path)
            .await
            .ok()
            .map(|m| m.len());
        let mut src = tokio::fs::File::open(source_path)
            .await
            .with_context(|| format!("opening share path {source_path}"))?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;

        let mut written: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK_BYTES];
        loop {
            self.check_cancelled()?;
            let n = tokio::io::AsyncReadExt::read(&mut src, &mut buf)
                .await
                .with_context(|| format!("reading share path {source_path}"))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
            written += n as u64;
            self.reporter.progress(written, total);
        }
        file.flush().await.context("flushing copy")?;
        Ok(written)
    }
}

impl<P: ProgressReporter> ArtifactFetcher for SourceDownloader<P> {
    async fn download(&self, source: &DownloadSource, dest: &Path) -> Result<u64> {
        self.check_cancelled()?;
        match source.kind {
            SourceKind::Http => self.download_http(&source.url, dest).await,
            SourceKind::Share => {
                let path = source.url.strip_prefix("file://").unwrap_or(&source.url);
                self.copy_from_share(path, dest).await
            }
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
