//! Content-addressed artifact cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! objects/<sha256>/<filename>   verified artifact content
//! staging/                      in-flight downloads, unique temp names
//! index.json                    size + last-used bookkeeping for eviction
//! ```
//!
//! Entry identity is the content hash, never the filename — two sources
//! serving the same bytes under different names collapse to one entry.
//! Writes land in `staging/` and reach `objects/` only via an atomic rename,
//! so a reader never observes a half-written entry, even across crashes.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::ports::{ArtifactStore, CommitOutcome};

const INDEX_FILENAME: &str = "index.json";

/// Compute the full-file SHA-256 hash, reading in 64 KiB chunks.
///
/// Returns the lowercase hex-encoded hash string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file for hashing")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Encode bytes as lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

// ── Index ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    filename: String,
    size_bytes: u64,
    last_used: DateTime<Utc>,
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Content-addressed cache with an LRU size cap.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
    max_bytes: u64,
    // Serializes index read-modify-write across the poll cycles. Object
    // content itself needs no lock: it is immutable once renamed in.
    index_lock: Arc<Mutex<()>>,
}

impl ArtifactCache {
    /// Open (and lay out) a cache rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory layout cannot be created.
    pub fn open(root: PathBuf, max_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(root.join("objects"))
            .with_context(|| format!("creating {}", root.join("objects").display()))?;
        std::fs::create_dir_all(root.join("staging"))
            .with_context(|| format!("creating {}", root.join("staging").display()))?;
        Ok(Self {
            root,
            max_bytes,
            index_lock: Arc::new(Mutex::new(())),
        })
    }

    fn object_dir(&self, sha256: &str) -> PathBuf {
        self.root.join("objects").join(sha256)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILENAME)
    }

    fn load_index(&self) -> CacheIndex {
        // A missing or unreadable index costs only LRU accuracy, never
        // correctness: entry content is always re-verified on lookup.
        std::fs::read_to_string(self.index_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save_index(&self, index: &CacheIndex) -> Result<()> {
        let content = serde_json::to_string_pretty(index).context("serializing cache index")?;
        let temp = self.index_path().with_extension("json.tmp");
        std::fs::write(&temp, content)
            .with_context(|| format!("writing {}", temp.display()))?;
        std::fs::rename(&temp, self.index_path())
            .with_context(|| format!("finalizing {}", self.index_path().display()))?;
        Ok(())
    }

    fn remove_entry(&self, index: &mut CacheIndex, sha256: &str) {
        let _ = std::fs::remove_dir_all(self.object_dir(sha256));
        index.entries.remove(sha256);
    }

    fn lookup_sync(&self, sha256: &str) -> Result<Option<PathBuf>> {
        let _guard = self.index_lock.lock().map_err(|_| poisoned())?;
        let dir = self.object_dir(sha256);
        if !dir.exists() {
            return Ok(None);
        }

        let mut index = self.load_index();
        let path = match index.entries.get(sha256) {
            Some(entry) => dir.join(&entry.filename),
            // Entry landed without index bookkeeping (crash mid-commit):
            // recover the filename from the object directory.
            None => match std::fs::read_dir(&dir)
                .ok()
                .and_then(|mut it| it.next())
                .and_then(std::result::Result::ok)
            {
                Some(first) => first.path(),
                None => {
                    self.remove_entry(&mut index, sha256);
                    let _ = self.save_index(&index);
                    return Ok(None);
                }
            },
        };

        // Re-verify on every hit; a corrupted entry is deleted, not repaired.
        let verified = path.is_file() && sha256_file(&path).is_ok_and(|actual| actual == sha256);
        if !verified {
            self.remove_entry(&mut index, sha256);
            let _ = self.save_index(&index);
            return Ok(None);
        }

        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        index.entries.insert(
            sha256.to_string(),
            CacheEntry {
                filename,
                size_bytes,
                last_used: Utc::now(),
            },
        );
        self.save_index(&index)?;
        Ok(Some(path))
    }

    fn commit_sync(
        &self,
        staged: &Path,
        expected_sha256: &str,
        filename: &str,
    ) -> Result<CommitOutcome> {
        let actual = sha256_file(staged)?;
        if actual != expected_sha256 {
            // Corrupt content is never kept, not even in staging.
            std::fs::remove_file(staged)
                .with_context(|| format!("removing corrupt staging file {}", staged.display()))?;
            return Ok(CommitOutcome::ChecksumMismatch { actual });
        }

        let _guard = self.index_lock.lock().map_err(|_| poisoned())?;
        let dir = self.object_dir(expected_sha256);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let destination = dir.join(filename);
        std::fs::rename(staged, &destination).with_context(|| {
            format!("moving verified artifact into {}", destination.display())
        })?;

        let size_bytes = std::fs::metadata(&destination).map(|m| m.len()).unwrap_or(0);
        let mut index = self.load_index();
        index.entries.insert(
            expected_sha256.to_string(),
            CacheEntry {
                filename: filename.to_string(),
                size_bytes,
                last_used: Utc::now(),
            },
        );
        self.evict_lru(&mut index, expected_sha256);
        self.save_index(&index)?;
        Ok(CommitOutcome::Committed(destination))
    }

    /// Remove least-recently-used entries until the cap is respected. The
    /// just-inserted entry is never evicted, even when it alone exceeds the
    /// cap — serving the artifact beats strict cap enforcement.
    fn evict_lru(&self, index: &mut CacheIndex, keep: &str) {
        loop {
            let total: u64 = index.entries.values().map(|e| e.size_bytes).sum();
            if total <= self.max_bytes {
                return;
            }
            let Some(oldest) = index
                .entries
                .iter()
                .filter(|(sha, _)| sha.as_str() != keep)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(sha, _)| sha.clone())
            else {
                return;
            };
            tracing::info!(sha256 = %oldest, "evicting artifact to respect cache size cap");
            self.remove_entry(index, &oldest);
        }
    }

    fn stage_sync(&self) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("download-")
            .suffix(".part")
            .tempfile_in(self.root.join("staging"))
            .context("allocating staging file")?;
        let path = file
            .into_temp_path()
            .keep()
            .context("detaching staging file")?;
        Ok(path)
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("cache index lock poisoned")
}

impl ArtifactStore for ArtifactCache {
    async fn stage(&self) -> Result<PathBuf> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.stage_sync())
            .await
            .context("staging task panicked")?
    }

    async fn lookup(&self, sha256: &str) -> Result<Option<PathBuf>> {
        let cache = self.clone();
        let sha256 = sha256.to_string();
        tokio::task::spawn_blocking(move || cache.lookup_sync(&sha256))
            .await
            .context("cache lookup task panicked")?
    }

    async fn commit(
        &self,
        staged: &Path,
        expected_sha256: &str,
        filename: &str,
    ) -> Result<CommitOutcome> {
        let cache = self.clone();
        let staged = staged.to_path_buf();
        let expected = expected_sha256.to_string();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || cache.commit_sync(&staged, &expected, &filename))
            .await
            .context("cache commit task panicked")?
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
