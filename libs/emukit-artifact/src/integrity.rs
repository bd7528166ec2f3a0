//! Size and checksum verification for cached artifacts.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::IntegrityError;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Measured size and SHA-256 digest of a file, computed in one streaming pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measured {
    pub size: u64,
    pub sha256: String,
}

/// Compute the size and SHA-256 digest of `path` without loading it into memory.
///
/// # Errors
/// Returns `IntegrityError::Read` if the file cannot be opened or read.
pub fn measure_file(path: &Path) -> Result<Measured, IntegrityError> {
    let mut file = std::fs::File::open(path).map_err(|source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = file.read(&mut buf).map_err(|source| IntegrityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }

    Ok(Measured {
        size,
        sha256: hex::encode(hasher.finalize()),
    })
}

/// Size and SHA-256 digest of an in-memory payload.
#[must_use]
pub fn measure_bytes(bytes: &[u8]) -> Measured {
    Measured {
        size: bytes.len() as u64,
        sha256: hex::encode(Sha256::digest(bytes)),
    }
}

/// Check a measurement against expected values. Checksum comparison is
/// case-insensitive on the hex digits.
///
/// # Errors
/// Returns `IntegrityError::Size` or `IntegrityError::Checksum` on mismatch.
pub fn check(
    name: &str,
    measured: &Measured,
    expected_size: u64,
    expected_sha256: &str,
) -> Result<(), IntegrityError> {
    if measured.size != expected_size {
        return Err(IntegrityError::Size {
            name: name.to_owned(),
            expected: expected_size,
            actual: measured.size,
        });
    }
    if !measured.sha256.eq_ignore_ascii_case(expected_sha256) {
        return Err(IntegrityError::Checksum {
            name: name.to_owned(),
            expected: expected_sha256.to_ascii_lowercase(),
            actual: measured.sha256.clone(),
        });
    }
    Ok(())
}
