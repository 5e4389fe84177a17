//! Error types for the streaming engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for stream operations.
///
/// Per-tick code never returns these to the host: they are logged and the
/// affected node or attribute is skipped for the tick.
#[derive(Error, Debug)]
pub enum Error {
    /// Source path could not be resolved to a reader
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// Node not found by path
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Node found but with an unexpected kind
    #[error("Node {path} is a {actual}, expected {expected}")]
    KindMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Split index out of bounds
    #[error("Invalid split index {index} (split count: {count})")]
    InvalidSplit { index: usize, count: usize },

    /// Operation requires a bound context
    #[error("Stream context is not bound")]
    Unbound,

    /// Malformed face range in an assignment manifest
    #[error("Invalid face range: {0}")]
    InvalidFaceRange(String),

    /// Malformed scene description
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML deserialization error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid scene error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidScene(msg.into())
    }
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::InvalidSplit { index: 5, count: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));

        let e = Error::KindMismatch {
            path: "/a".into(),
            expected: "mesh".into(),
            actual: "camera".into(),
        };
        assert_eq!(e.to_string(), "Node /a is a camera, expected mesh");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
