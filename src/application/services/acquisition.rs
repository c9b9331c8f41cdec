//! Artifact acquisition: cache-first, then sources in priority order.
//!
//! A corrupt file from one source must not be kept and must not block trying
//! the next source. Verified content is committed to the cache atomically, so
//! a reader never observes a half-written entry.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::{ArtifactFetcher, ArtifactStore, CommitOutcome, ProgressReporter};
use crate::domain::error::AcquisitionError;
use crate::domain::task::ArtifactSpec;

/// Return a verified local path for `artifact`.
///
/// Cache hits (re-verified by the store) return without any network access.
///
/// # Errors
///
/// Returns [`AcquisitionError::NoSources`] when the artifact declares no sources,
/// or [`AcquisitionError::AllSourcesFailed`] naming the last error after every
/// source has been tried once.
pub async fn acquire(
    store: &impl ArtifactStore,
    fetcher: &impl ArtifactFetcher,
    reporter: &impl ProgressReporter,
    artifact: &ArtifactSpec,
) -> Result<PathBuf> {
    if let Some(path) = store.lookup(&artifact.sha256).await? {
        reporter.step(&format!("cache hit for {}", artifact.filename));
        return Ok(path);
    }

    let sources = artifact.sources_by_priority();
    if sources.is_empty() {
        return Err(AcquisitionError::NoSources {
            artifact: artifact.filename.clone(),
        }
        .into());
    }

    let mut last_error = String::new();
    let mut integrity = false;

    for source in &sources {
        reporter.step(&format!(
            "downloading {} from {}",
            artifact.filename, source.url
        ));
        let staged = store.stage().await?;

        match fetcher.download(source, &staged).await {
            Err(e) => {
                reporter.warn(&format!("source {} failed: {e:#}", source.url));
                last_error = format!("{e:#}");
                let _ = tokio::fs::remove_file(&staged).await;
            }
            Ok(_bytes) => match store.commit(&staged, &artifact.sha256, &artifact.filename).await? {
                CommitOutcome::Committed(path) => {
                    reporter.success(&format!("verified {}", artifact.filename));
                    return Ok(path);
                }
                CommitOutcome::ChecksumMismatch { actual } => {
                    reporter.warn(&format!(
                        "checksum mismatch from {}: expected {}, got {actual}",
                        source.url, artifact.sha256
                    ));
                    last_error =
                        format!("checksum mismatch: expected {}, got {actual}", artifact.sha256);
                    integrity = true;
                }
            },
        }
    }

    Err(AcquisitionError::AllSourcesFailed {
        artifact: artifact.filename.clone(),
        tried: sources.len(),
        last: last_error,
        integrity,
    }
    .into())
}

// ── Unit tests ────────────────────────────────────────────────────────────────
