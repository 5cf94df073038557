//! Error types for serverlist-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from encoding or decoding the membership payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload was not a JSON array of member records.
    #[error("membership JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store returned a record with no bytes in it.
    #[error("membership payload is empty")]
    Empty,
}

/// Missing or malformed settings. Always fatal, raised before any round runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {var}; is the {var} env var defined?")]
    Missing { var: &'static str },

    #[error("invalid {var} value: {source}")]
    InvalidHex {
        var: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("invalid {var} value: expected {expected} bytes, got {actual}")]
    InvalidLength {
        var: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {var} value '{value}': expected a non-negative integer")]
    InvalidNumber { var: &'static str, value: String },

    /// A line in the env file could not be parsed.
    #[error("malformed env file {path} at line {line}: {reason}")]
    EnvFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
