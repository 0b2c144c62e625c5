//! Error types for the restic exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a restic invocation ended when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The process exited with a non-zero code
    Exited(i32),
    /// The process was terminated by a signal
    Signaled,
    /// The invocation exceeded its timeout and was killed
    TimedOut(Duration),
    /// The process could not be started at all
    SpawnFailed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Exited(code) => write!(f, "exit code {}", code),
            CommandStatus::Signaled => write!(f, "killed by signal"),
            CommandStatus::TimedOut(timeout) => {
                write!(f, "timed out after {}s", timeout.as_secs_f64())
            }
            CommandStatus::SpawnFailed => write!(f, "failed to spawn"),
        }
    }
}

/// Main error type for restic exporter operations.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A restic invocation failed or timed out
    #[error("Error executing restic {subcommand} command ({status}): {stderr_excerpt}")]
    Execution {
        subcommand: String,
        status: CommandStatus,
        stderr_excerpt: String,
    },

    /// restic produced output of an unexpected shape
    #[error("Failed to parse restic {subcommand} output: {reason}. Output preview: {excerpt}")]
    Parse {
        subcommand: String,
        reason: String,
        excerpt: String,
    },

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// Builds a configuration error from a plain message.
    pub fn config(message: impl Into<String>) -> Self {
        ExporterError::Config(config::ConfigError::Message(message.into()))
    }

    /// Builds a parse error, keeping only a short preview of the raw output.
    pub fn parse(subcommand: &str, reason: impl fmt::Display, raw: &[u8]) -> Self {
        ExporterError::Parse {
            subcommand: subcommand.to_string(),
            reason: reason.to_string(),
            excerpt: excerpt(&String::from_utf8_lossy(raw), PARSE_EXCERPT_CHARS),
        }
    }
}

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

pub(crate) const PARSE_EXCERPT_CHARS: usize = 200;
pub(crate) const STDERR_EXCERPT_CHARS: usize = 512;

/// Folds newlines into spaces and truncates on a character boundary.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let folded = text.trim().replace(['\r', '\n'], " ");
    match folded.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &folded[..idx]),
        None => folded,
    }
}
