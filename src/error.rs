//! Error types shared by every stage of a regression run.
//!
//! Everything here is fatal. Visual differences are not errors: they are
//! reported through [`crate::diff::Comparison`] values.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::window::WindowSize;

/// Result type for regrecss operations
pub type Result<T> = std::result::Result<T, RegressionError>;

/// Fatal errors raised while interpreting scripts, driving browsers,
/// packing archives or diffing images
#[derive(Error, Debug)]
pub enum RegressionError {
    /// Invalid script or test configuration (duplicate names, no tests, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed script text
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Baseline and candidate images for one key have different sizes
    #[error(
        "Unexpected inconsistency in image sizes for {key}: baseline {}x{}, candidate {}x{}",
        .base.0, .base.1, .candidate.0, .candidate.1
    )]
    DimensionMismatch {
        key: String,
        base: (u32, u32),
        candidate: (u32, u32),
    },

    /// The fresh run produced a different set of images than the archive holds
    #[error(
        "Unexpected inconsistency between the test suite's image set and the newly created one\n  baseline:  {}\n  candidate: {}",
        format_set(.baseline),
        format_set(.candidate)
    )]
    SnapshotSetMismatch {
        baseline: BTreeSet<String>,
        candidate: BTreeSet<String>,
    },

    /// An archive entry that is neither a script nor a snapshot image
    #[error("Unknown filetype: {0}")]
    UnknownFiletype(String),

    /// A file name that does not parse as a snapshot key token
    #[error("Invalid snapshot key '{0}'")]
    InvalidKey(String),

    /// The browser session disappeared while being polled
    #[error("Browser quit unexpectedly")]
    SessionLost,

    /// `assert_window_size` found a different live geometry
    #[error("Dimensions do not match: expected {expected}, browser reports {actual}")]
    WindowMismatch {
        expected: WindowSize,
        actual: WindowSize,
    },

    /// A bounded poll ran out of time
    #[error("Timed out after {seconds:.1}s waiting for {what}")]
    PollTimeout { what: String, seconds: f64 },

    /// The browser driver failed
    #[error("Driver error: {0}")]
    Driver(String),

    /// Image decode/encode failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegressionError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        RegressionError::Config(msg.into())
    }

    /// Shorthand for a driver error
    pub fn driver(msg: impl Into<String>) -> Self {
        RegressionError::Driver(msg.into())
    }
}

fn format_set(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        return "(none)".to_string();
    }
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lost_message() {
        assert_eq!(RegressionError::SessionLost.to_string(), "Browser quit unexpectedly");
    }

    #[test]
    fn test_set_mismatch_lists_both_sets() {
        let err = RegressionError::SnapshotSetMismatch {
            baseline: ["0:a:default:0:.png".to_string()].into_iter().collect(),
            candidate: BTreeSet::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("baseline:  0:a:default:0:.png"));
        assert!(msg.contains("candidate: (none)"));
    }
}
