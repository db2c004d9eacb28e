//! Snapshot identity.
//!
//! Every captured image is stored under a [`SnapshotKey`] token of the form
//! `ordinal:test:window:local:` (the trailing colon is part of the token).
//! The token doubles as the file name stem inside test suite archives, so a
//! baseline image and its freshly captured candidate are joined by comparing
//! tokens. Field order and separator must never change.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegressionError;

/// Extension of every snapshot image
pub const IMAGE_EXTENSION: &str = "png";

const SEPARATOR: char = ':';

/// Identity of one captured image
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    /// Global capture number across the whole run
    pub ordinal: u64,
    pub test_name: String,
    pub window_name: String,
    /// Capture number within the test
    pub local_index: u64,
}

impl SnapshotKey {
    pub fn new(
        ordinal: u64,
        test_name: impl Into<String>,
        window_name: impl Into<String>,
        local_index: u64,
    ) -> Self {
        Self {
            ordinal,
            test_name: test_name.into(),
            window_name: window_name.into(),
            local_index,
        }
    }

    /// Serialized token, e.g. `7:login:800x600:2:`
    pub fn token(&self) -> String {
        self.to_string()
    }

    /// File name of the image stored under this key
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, IMAGE_EXTENSION)
    }

    /// Parse an image file name back into its key
    pub fn from_file_name(file_name: &str) -> Result<Self, RegressionError> {
        let stem = file_name
            .strip_suffix(IMAGE_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| RegressionError::InvalidKey(file_name.to_string()))?;
        stem.parse()
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}",
            self.ordinal,
            self.test_name,
            self.window_name,
            self.local_index,
            sep = SEPARATOR
        )
    }
}

impl FromStr for SnapshotKey {
    type Err = RegressionError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || RegressionError::InvalidKey(token.to_string());
        let fields: Vec<&str> = token.split(SEPARATOR).collect();
        let [ordinal, test_name, window_name, local_index, tail] = fields.as_slice() else {
            return Err(invalid());
        };
        if !tail.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            ordinal: ordinal.parse().map_err(|_| invalid())?,
            test_name: test_name.to_string(),
            window_name: window_name.to_string(),
            local_index: local_index.parse().map_err(|_| invalid())?,
        })
    }
}

/// Represents a captured snapshot written to the scratch directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedSnapshot {
    pub key: SnapshotKey,

    /// Optional label given in the script; not part of the identity
    pub label: Option<String>,

    /// Path to the image file
    pub image_path: PathBuf,

    /// Timestamp when the snapshot was taken
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl CapturedSnapshot {
    pub fn new(key: SnapshotKey, label: Option<String>, image_path: PathBuf) -> Self {
        Self {
            key,
            label,
            image_path,
            timestamp: Utc::now(),
        }
    }
}

/// Test and window names end up inside tokens and file names, so they must
/// not contain the separator or path characters
pub fn validate_name(kind: &str, name: &str) -> Result<(), RegressionError> {
    if name.is_empty() {
        return Err(RegressionError::config(format!("{} name must not be empty", kind)));
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, ':' | '/' | '\\') || c.is_control()) {
        return Err(RegressionError::config(format!(
            "{} name '{}' contains forbidden character {:?}",
            kind, name, bad
        )));
    }
    Ok(())
}
