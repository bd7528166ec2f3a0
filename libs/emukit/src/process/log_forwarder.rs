//! Forwarding of emulator stdout/stderr into the parent's tracing system.
//!
//! Each line is tagged with the emulator name and re-emitted at the level
//! detected from the line itself, so a Java emulator's WARN shows up as a
//! WARN here rather than as undifferentiated stdout noise.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Stream type identifier for logging
#[derive(Debug, Clone, Copy)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Detect the log level of a child-process output line.
///
/// Two formats are recognized: `<timestamp> LEVEL ...` plain text (what the
/// Java emulators and tracing-subscriber both emit) and JSON objects with a
/// `"level"` field. Unrecognized lines default to INFO.
fn detect_log_level(line: &str) -> Level {
    if let Some(level) = detect_json_level(line) {
        return level;
    }
    if let Some(level) = detect_plain_level(line) {
        return level;
    }
    Level::INFO
}

fn detect_plain_level(line: &str) -> Option<Level> {
    let mut parts = line.split_whitespace();
    let _timestamp = parts.next()?;
    let level_str = parts.next()?;

    match level_str {
        "ERROR" | "error" | "SEVERE" => Some(Level::ERROR),
        "WARN" | "warn" | "WARNING" => Some(Level::WARN),
        "INFO" | "info" => Some(Level::INFO),
        "DEBUG" | "debug" | "FINE" => Some(Level::DEBUG),
        "TRACE" | "trace" | "FINEST" => Some(Level::TRACE),
        _ => None,
    }
}

fn detect_json_level(line: &str) -> Option<Level> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('{') || !trimmed.contains("\"level\"") {
        return None;
    }

    let v: Value = serde_json::from_str(trimmed).ok()?;
    let level = v.get("level")?.as_str()?.to_ascii_lowercase();

    match level.as_str() {
        "error" | "severe" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" | "fine" => Some(Level::DEBUG),
        "trace" | "finest" => Some(Level::TRACE),
        _ => None,
    }
}

fn forward_line(emulator: &str, stream: StreamKind, line: &str) {
    match detect_log_level(line) {
        Level::ERROR => {
            tracing::error!(emulator, stream = %stream, "{line}");
        }
        Level::WARN => {
            tracing::warn!(emulator, stream = %stream, "{line}");
        }
        Level::INFO => {
            tracing::info!(emulator, stream = %stream, "{line}");
        }
        Level::DEBUG => {
            tracing::debug!(emulator, stream = %stream, "{line}");
        }
        Level::TRACE => {
            tracing::trace!(emulator, stream = %stream, "{line}");
        }
    }
}

/// Spawn a task pumping lines from a child stream into tracing until the
/// stream closes or the session token is cancelled.
pub fn spawn_stream_forwarder<S>(
    stream: S,
    emulator: String,
    cancel: CancellationToken,
    kind: StreamKind,
) -> JoinHandle<()>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(emulator = %emulator, stream = ?kind, "log forwarder cancelled");
                    break;
                }

                result = lines.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            forward_line(&emulator, kind, &line);
                        }
                        Ok(None) => {
                            tracing::debug!(emulator = %emulator, stream = ?kind, "log stream closed");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                emulator = %emulator,
                                stream = ?kind,
                                error = %e,
                                "log stream read error"
                            );
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_levels() {
        assert_eq!(
            detect_log_level("2026-08-06T10:00:00Z  INFO database: listening on 127.0.0.1:9000"),
            Level::INFO
        );
        assert_eq!(
            detect_log_level("2026-08-06T10:00:00Z DEBUG firestore: index rebuilt"),
            Level::DEBUG
        );
        assert_eq!(
            detect_log_level("2026-08-06T10:00:00Z  WARN hosting: rewrite rule shadowed"),
            Level::WARN
        );
        assert_eq!(
            detect_log_level("2026-08-06T10:00:00Z ERROR functions: worker crashed"),
            Level::ERROR
        );
    }

    #[test]
    fn java_util_logging_levels() {
        assert_eq!(
            detect_log_level("Aug 06, 2026 SEVERE com.cumulus.emulator: bind failed"),
            Level::ERROR
        );
        assert_eq!(
            detect_log_level("Aug 06, 2026 WARNING com.cumulus.emulator: deprecated flag"),
            Level::WARN
        );
    }

    #[test]
    fn json_levels() {
        assert_eq!(
            detect_log_level(r#"{"timestamp":"2026-08-06T10:00:00Z","level":"WARN","message":"m"}"#),
            Level::WARN
        );
        assert_eq!(
            detect_log_level(r#"{"level":"debug","message":"m"}"#),
            Level::DEBUG
        );
    }

    #[test]
    fn unrecognized_lines_default_to_info() {
        assert_eq!(detect_log_level("Serving on port 8080..."), Level::INFO);
        assert_eq!(detect_log_level(""), Level::INFO);
    }

    #[test]
    fn stream_kind_display() {
        assert_eq!(format!("{}", StreamKind::Stdout), "stdout");
        assert_eq!(format!("{}", StreamKind::Stderr), "stderr");
    }
}
