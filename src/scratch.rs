//! Scratch directories for freshly captured images.
//!
//! Every create/test run writes its captures into its own directory under a
//! common base. The directory is removed when the [`ScratchDir`] is dropped
//! unless it was marked to be kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::snapshot::SnapshotKey;

/// A capture directory with cleanup on drop
#[derive(Debug)]
pub struct ScratchDir {
    /// Unique directory ID
    pub id: String,
    /// Root directory of this run
    pub dir: PathBuf,
    /// Whether to keep files after the run ends
    pub keep: bool,
}

impl ScratchDir {
    /// Create and initialize a fresh directory under `base`
    pub fn create(base: &Path, prefix: &str) -> std::io::Result<Self> {
        let id = format!("{}_{}", sanitize_name(prefix), generate_run_suffix());
        let scratch = Self {
            dir: base.join(&id),
            id,
            keep: false,
        };
        scratch.init()?;
        Ok(scratch)
    }

    /// Set whether to keep files after the run ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        fs::write(
            self.dir.join(".scratch.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(())
    }

    /// Where the image for a key is written
    pub fn image_path(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Remove the directory unless it is kept
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.keep {
            debug!("keeping scratch directory {}", self.dir.display());
        } else if let Err(e) = self.cleanup() {
            warn!("failed to remove scratch directory {}: {}", self.dir.display(), e);
        }
    }
}

/// Timestamp plus pid, unique per process and second; a counter covers
/// several directories created within the same second
fn generate_run_suffix() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static SEQ: AtomicU32 = AtomicU32::new(0);

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!(
        "{}_{}_{}_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        millis % 1000,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Sanitize a name for use in directory names
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("suite.tar"), "suite_tar");
        assert_eq!(sanitize_name("a/b\\c d"), "a_b_c_d");
    }

    #[test]
    fn test_scratch_dir_lifecycle() {
        let base = tempfile::tempdir().unwrap();
        let dir = {
            let scratch = ScratchDir::create(base.path(), "create").unwrap();
            assert!(scratch.id.starts_with("create_"));
            assert!(scratch.dir.join(".scratch.json").exists());
            scratch.dir.clone()
        };
        assert!(!dir.exists(), "scratch dir should be removed on drop");
    }

    #[test]
    fn test_kept_scratch_dir_survives() {
        let base = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(base.path(), "test").unwrap().keep(true);
        let dir = scratch.dir.clone();
        drop(scratch);
        assert!(dir.exists());
    }

    #[test]
    fn test_image_path_uses_key_file_name() {
        let base = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(base.path(), "x").unwrap();
        let key = SnapshotKey::new(0, "t", "default", 0);
        assert_eq!(scratch.image_path(&key), scratch.dir.join("0:t:default:0:.png"));
    }

    #[test]
    fn test_unique_ids() {
        let base = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(base.path(), "run").unwrap();
        let b = ScratchDir::create(base.path(), "run").unwrap();
        assert_ne!(a.dir, b.dir);
    }
}
