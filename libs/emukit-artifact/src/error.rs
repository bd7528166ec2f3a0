use std::path::PathBuf;

/// Network or storage failure while fetching an artifact.
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cache directory {dir} is unusable: {source}")]
    Cache {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Size or checksum mismatch against the descriptor's expected values.
#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    #[error("size mismatch for '{name}': expected {expected} bytes, got {actual}")]
    Size {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error("checksum mismatch for '{name}': expected sha256:{expected}, got sha256:{actual}")]
    Checksum {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything `ensure_available` can fail with.
#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}
