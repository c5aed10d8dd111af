//! Error types for par2guard
//!
//! This module provides the error taxonomy of the orchestration engine:
//! - Input errors raised while resolving a selection into jobs
//! - Launch and termination errors from the external `par2` process
//! - Configuration errors with the offending key
//! - A process exit code mapping for command line front ends
//!
//! Unrecognised tool output is not an error: it is recorded as a
//! [`ParseAnomaly`](crate::types::ParseAnomaly) on the job result instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for par2guard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for par2guard
#[derive(Debug, Error)]
pub enum Error {
    /// The selection contains nothing a job can be built from
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable description of what was wrong with the selection
        message: String,
        /// The path that triggered the error, if a single one is to blame
        path: Option<PathBuf>,
    },

    /// The external tool could not be found or started
    #[error("failed to launch {}: {source}", program.display())]
    ProcessLaunch {
        /// The program that was being launched
        program: PathBuf,
        /// Underlying spawn or lookup error
        #[source]
        source: std::io::Error,
    },

    /// The external tool was stopped by a cancellation request
    #[error("process terminated by cancellation")]
    ProcessTerminated,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "redundancy_percent")
        key: Option<String>,
    },

    /// Configuration file could not be parsed
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidInput`] without a specific path
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            path: None,
        }
    }

    /// Shorthand for an [`Error::InvalidInput`] blaming one path
    pub fn invalid_path(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Shorthand for an [`Error::Config`] naming the offending key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error is the result of a user cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::ProcessTerminated)
    }
}

/// Map errors to process exit codes and machine-readable codes
///
/// Used by command line front ends to turn an error into a stable exit
/// status and a code suitable for JSON output.
pub trait ToExitCode {
    /// Process exit code for this error
    fn exit_code(&self) -> i32;

    /// Machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            // Nothing ran: the request itself was unusable
            Error::InvalidInput { .. } => 2,
            Error::Config { .. } => 2,
            Error::ConfigParse(_) => 2,
            Error::ProcessLaunch { .. } => 2,

            // 128 + SIGINT, the shell convention for an interrupted command
            Error::ProcessTerminated => 130,

            Error::Io(_) => 1,
            Error::Serialization(_) => 1,
            Error::Other(_) => 1,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::InvalidInput { .. } => "invalid_input",
            Error::ProcessLaunch { .. } => "process_launch_error",
            Error::ProcessTerminated => "process_terminated",
            Error::Config { .. } => "config_error",
            Error::ConfigParse(_) => "config_parse_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, i32, &'static str)> {
        vec![
            (
                Error::invalid_input("no .par2 files found"),
                2,
                "invalid_input",
            ),
            (
                Error::ProcessLaunch {
                    program: PathBuf::from("par2"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                },
                2,
                "process_launch_error",
            ),
            (Error::ProcessTerminated, 130, "process_terminated"),
            (
                Error::config("redundancy_percent", "must be between 1 and 100"),
                2,
                "config_error",
            ),
            (
                Error::Io(std::io::Error::other("disk")),
                1,
                "io_error",
            ),
            (Error::Other("boom".into()), 1, "internal_error"),
        ]
    }

    #[test]
    fn exit_and_error_codes_cover_every_variant() {
        for (error, exit_code, code) in all_error_variants() {
            assert_eq!(error.exit_code(), exit_code, "exit code for {error:?}");
            assert_eq!(error.error_code(), code, "error code for {error:?}");
        }
    }

    #[test]
    fn invalid_path_keeps_the_offending_path() {
        let err = Error::invalid_path("folder is empty", "/music/Empty");
        match err {
            Error::InvalidInput { path, message } => {
                assert_eq!(path, Some(PathBuf::from("/music/Empty")));
                assert_eq!(message, "folder is empty");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn launch_error_message_names_the_program() {
        let err = Error::ProcessLaunch {
            program: PathBuf::from("/opt/par2"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/opt/par2"), "got: {msg}");
        assert!(msg.contains("no such file"), "got: {msg}");
    }

    #[test]
    fn only_termination_counts_as_cancellation() {
        assert!(Error::ProcessTerminated.is_cancellation());
        assert!(!Error::invalid_input("x").is_cancellation());
    }

    #[test]
    fn toml_errors_convert_into_config_parse() {
        let parse_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::ConfigParse(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
