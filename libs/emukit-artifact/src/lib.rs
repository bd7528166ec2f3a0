//! Artifact cache for emulator binaries.
//!
//! Emulator binaries (Java jars, runtime executables) are versioned
//! downloads described by an [`ArtifactDescriptor`]. The cache guarantees
//! that the canonical local path either holds a file whose size and
//! SHA-256 digest match the descriptor, or holds nothing at all: downloads
//! land in a temporary file first and are only moved into place after
//! verification.

pub mod error;
pub mod integrity;

pub use error::{ArtifactError, DownloadError, IntegrityError};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// A specific downloadable emulator binary version.
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    /// File name under the cache directory, e.g. `cumulus-database-emulator-1.4.2.jar`.
    pub name: String,
    pub version: String,
    pub cache_dir: PathBuf,
    pub remote_url: String,
    pub expected_size: u64,
    /// Lowercase or uppercase hex; compared case-insensitively.
    pub expected_sha256: String,
}

impl ArtifactDescriptor {
    /// Canonical path the verified artifact lives at.
    #[must_use]
    pub fn local_path(&self) -> PathBuf {
        self.cache_dir.join(&self.name)
    }
}

/// Bounded-retry policy for artifact downloads.
///
/// Only network/storage failures are retried; an integrity mismatch after a
/// completed download fails the call immediately (the next call re-fetches).
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Backoff before the second attempt; doubles for each further attempt.
    pub initial_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl FetchPolicy {
    fn backoff_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; no sleep before the first try
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff * 2u32.saturating_pow(exp.saturating_sub(1))
    }
}

/// Artifact cache frontend. Holds the HTTP client and retry policy.
pub struct ArtifactStore {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(FetchPolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: FetchPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// Return a verified local path for the artifact, downloading it if the
    /// cached copy is missing or fails verification.
    ///
    /// The warm-cache path (file present, size and digest match) performs no
    /// network access. A corrupt cached file is treated as absent and
    /// re-fetched, never reused.
    ///
    /// # Errors
    /// `ArtifactError::Download` after the retry budget is exhausted, or
    /// `ArtifactError::Integrity` if the downloaded payload does not match
    /// the descriptor.
    pub async fn ensure_available(
        &self,
        desc: &ArtifactDescriptor,
    ) -> Result<PathBuf, ArtifactError> {
        let local = desc.local_path();

        if local.exists() {
            match verify_local(desc, &local) {
                Ok(()) => {
                    tracing::debug!(
                        artifact = %desc.name,
                        version = %desc.version,
                        path = %local.display(),
                        "artifact cache hit"
                    );
                    return Ok(local);
                }
                Err(e) => {
                    tracing::warn!(
                        artifact = %desc.name,
                        error = %e,
                        "cached artifact failed verification, re-fetching"
                    );
                }
            }
        }

        let payload = self.fetch_with_retry(desc).await?;

        let measured = integrity::measure_bytes(&payload);
        integrity::check(&desc.name, &measured, desc.expected_size, &desc.expected_sha256)?;

        persist(desc, &local, &payload)?;

        tracing::info!(
            artifact = %desc.name,
            version = %desc.version,
            size = measured.size,
            path = %local.display(),
            "artifact downloaded and verified"
        );
        Ok(local)
    }

    async fn fetch_with_retry(&self, desc: &ArtifactDescriptor) -> Result<Vec<u8>, DownloadError> {
        let mut last_err: Option<DownloadError> = None;

        for attempt in 1..=self.policy.attempts.max(1) {
            if attempt > 1 {
                let delay = self.policy.backoff_before(attempt);
                tracing::debug!(
                    artifact = %desc.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying artifact download"
                );
                tokio::time::sleep(delay).await;
            }

            match self.fetch_once(desc).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(
                        artifact = %desc.name,
                        attempt,
                        error = %e,
                        "artifact download attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        // attempts >= 1, so at least one fetch ran and recorded an error
        Err(last_err.unwrap_or_else(|| DownloadError::Status {
            url: desc.remote_url.clone(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }))
    }

    async fn fetch_once(&self, desc: &ArtifactDescriptor) -> Result<Vec<u8>, DownloadError> {
        let url = &desc.remote_url;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.clone(),
                status,
            });
        }

        let bytes = resp.bytes().await.map_err(|source| DownloadError::Body {
            url: url.clone(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

fn verify_local(desc: &ArtifactDescriptor, path: &Path) -> Result<(), IntegrityError> {
    let measured = integrity::measure_file(path)?;
    integrity::check(&desc.name, &measured, desc.expected_size, &desc.expected_sha256)
}

/// Write the verified payload through a temp file and atomically move it
/// into place, so a crash never leaves a partial file at the canonical path.
fn persist(desc: &ArtifactDescriptor, local: &Path, payload: &[u8]) -> Result<(), DownloadError> {
    use std::io::Write;

    std::fs::create_dir_all(&desc.cache_dir).map_err(|source| DownloadError::Cache {
        dir: desc.cache_dir.clone(),
        source,
    })?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(&desc.cache_dir).map_err(|source| DownloadError::Cache {
            dir: desc.cache_dir.clone(),
            source,
        })?;

    tmp.write_all(payload).map_err(|source| DownloadError::Cache {
        dir: desc.cache_dir.clone(),
        source,
    })?;

    tmp.persist(local).map_err(|e| DownloadError::Cache {
        dir: desc.cache_dir.clone(),
        source: e.error,
    })?;

    Ok(())
}
