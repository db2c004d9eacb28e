//! Test suite archives.
//!
//! A suite is a tar file with a single root directory holding the scripts,
//! renamed `0.<ext>`, `1.<ext>`, ... in execution order, and every baseline
//! image named after its snapshot key token. [`create_suite`] builds one from
//! script files; [`test_suite`] replays its scripts and diffs the fresh images
//! against the stored baselines.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::diff::{Comparison, compare_png};
use crate::driver::BrowserLauncher;
use crate::error::{RegressionError, Result};
use crate::runner::Runner;
use crate::scratch::ScratchDir;
use crate::script::{Interpreter, Script};
use crate::snapshot::{CapturedSnapshot, IMAGE_EXTENSION, SnapshotKey};

/// Root directory inside every suite archive
pub const ARCHIVE_ROOT: &str = "testsuite_DO_NOT_MODIFY";

/// Extension given to scripts whose source file has none
pub const DEFAULT_SCRIPT_EXTENSION: &str = "rcs";

/// A script stored in a suite
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedScript {
    /// Execution position
    pub index: usize,
    /// Entry name inside the root, e.g. `0.rcs`
    pub file_name: String,
    pub source: String,
}

/// In-memory contents of a suite archive
#[derive(Debug, Default)]
pub struct SuiteArchive {
    /// Sorted by index
    pub scripts: Vec<ArchivedScript>,
    /// Baseline PNG bytes by file name (`<token>.png`)
    pub images: BTreeMap<String, Vec<u8>>,
}

/// What an archive entry name stands for
#[derive(Debug, PartialEq)]
enum EntryKind {
    Script(usize),
    Image(SnapshotKey),
}

fn classify(name: &str) -> Result<EntryKind> {
    let unknown = || RegressionError::UnknownFiletype(name.to_string());
    let (stem, ext) = name.rsplit_once('.').ok_or_else(unknown)?;
    if ext == IMAGE_EXTENSION {
        return SnapshotKey::from_file_name(name)
            .map(EntryKind::Image)
            .map_err(|_| unknown());
    }
    if !stem.is_empty() && !ext.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
        let index = stem.parse().map_err(|_| unknown())?;
        return Ok(EntryKind::Script(index));
    }
    Err(unknown())
}

/// File name of an entry below the root; `None` for the root itself
fn entry_name(path: &Path) -> Result<Option<String>> {
    let unknown = || RegressionError::UnknownFiletype(path.display().to_string());
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(root)) if root == ARCHIVE_ROOT => {}
        _ => return Err(unknown()),
    }
    let name = match components.next() {
        None => return Ok(None),
        Some(Component::Normal(name)) => name.to_string_lossy().to_string(),
        Some(_) => return Err(unknown()),
    };
    if components.next().is_some() {
        return Err(unknown());
    }
    Ok(Some(name))
}

fn entry_path(name: &str) -> String {
    format!("{}/{}", ARCHIVE_ROOT, name)
}

impl SuiteArchive {
    /// Read and classify every entry of a suite archive
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = tar::Archive::new(file);
        let mut suite = SuiteArchive::default();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_path_buf(); // Clone to release borrow

            if path.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(RegressionError::UnknownFiletype(format!(
                    "{} (path traversal)",
                    path.display()
                )));
            }
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let Some(name) = entry_name(&path)? else {
                continue;
            };
            if !entry.header().entry_type().is_file() {
                return Err(RegressionError::UnknownFiletype(name));
            }

            match classify(&name)? {
                EntryKind::Script(index) => {
                    let mut source = String::new();
                    entry.read_to_string(&mut source)?;
                    if suite.scripts.iter().any(|s| s.index == index) {
                        return Err(RegressionError::config(format!(
                            "Archive holds more than one script numbered {}",
                            index
                        )));
                    }
                    suite.scripts.push(ArchivedScript {
                        index,
                        file_name: name,
                        source,
                    });
                }
                EntryKind::Image(key) => {
                    debug!(key = %key, "baseline image");
                    let mut data = Vec::new();
                    entry.read_to_end(&mut data)?;
                    suite.images.insert(name, data);
                }
            }
        }

        suite.scripts.sort_by_key(|s| s.index);
        for (expected, script) in suite.scripts.iter().enumerate() {
            if script.index != expected {
                return Err(RegressionError::config(format!(
                    "Archive scripts must be numbered 0 to {}, found {}",
                    suite.scripts.len() - 1,
                    script.file_name
                )));
            }
        }
        debug!(
            scripts = suite.scripts.len(),
            images = suite.images.len(),
            "read suite archive {}",
            path.display()
        );
        Ok(suite)
    }

    /// Write the suite as a tar file, scripts first, images in token order
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut builder = tar::Builder::new(file);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(now_seconds());
        header.set_cksum();
        builder.append_data(&mut header, format!("{}/", ARCHIVE_ROOT), std::io::empty())?;

        for script in &self.scripts {
            append_file(&mut builder, &script.file_name, script.source.as_bytes())?;
        }
        for (name, data) in &self.images {
            append_file(&mut builder, name, data)?;
        }

        builder.into_inner()?;
        Ok(())
    }

    /// Baseline file names
    pub fn image_names(&self) -> BTreeSet<String> {
        self.images.keys().cloned().collect()
    }
}

fn append_file(builder: &mut tar::Builder<File>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(now_seconds());
    header.set_cksum();
    builder.append_data(&mut header, entry_path(name), data)?;
    Ok(())
}

fn now_seconds() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Interpret every source with one interpreter so names and ids span the run
fn interpret_all<'s>(sources: impl IntoIterator<Item = (&'s str, &'s str)>) -> Result<Vec<Script>> {
    let mut interpreter = Interpreter::new();
    let mut scripts = Vec::new();
    for (name, source) in sources {
        debug!(script = name, "interpreting");
        let script = interpreter.interpret(source)?;
        info!(script = name, tests = script.tests.len(), "interpreted script");
        scripts.push(script);
    }
    Ok(scripts)
}

fn run_scripts(
    scripts: &[Script],
    launcher: &dyn BrowserLauncher,
    config: &Config,
    scratch: &ScratchDir,
) -> Result<Vec<CapturedSnapshot>> {
    let mut runner = Runner::new(launcher, config.polling.clone(), scratch);
    for script in scripts {
        runner.run_script(script)?;
    }
    Ok(runner.into_captures())
}

/// Run `scripts` in order and store them with their captures at `output`
pub fn create_suite(
    scripts: &[PathBuf],
    output: &Path,
    launcher: &dyn BrowserLauncher,
    config: &Config,
) -> Result<Vec<CapturedSnapshot>> {
    if scripts.is_empty() {
        return Err(RegressionError::config("No scripts given"));
    }

    let mut suite = SuiteArchive::default();
    for (index, path) in scripts.iter().enumerate() {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .filter(|e| !e.is_empty() && e != IMAGE_EXTENSION)
            .unwrap_or_else(|| DEFAULT_SCRIPT_EXTENSION.to_string());
        suite.scripts.push(ArchivedScript {
            index,
            file_name: format!("{}.{}", index, ext),
            source: fs::read_to_string(path)?,
        });
    }

    let parsed = interpret_all(
        scripts
            .iter()
            .zip(&suite.scripts)
            .map(|(path, s)| (path.to_str().unwrap_or(&s.file_name), s.source.as_str())),
    )?;

    let scratch = ScratchDir::create(&config.output.scratch_dir, "create")?;
    let captures = run_scripts(&parsed, launcher, config, &scratch)?;

    for capture in &captures {
        let data = fs::read(&capture.image_path)?;
        suite.images.insert(capture.key.file_name(), data);
    }
    suite.write(output)?;

    info!(
        scripts = suite.scripts.len(),
        snapshots = captures.len(),
        "created test suite {}",
        output.display()
    );
    Ok(captures)
}

/// Replay a suite's scripts and diff every fresh image against its baseline.
///
/// Any fatal error, including a single dimension mismatch, aborts before
/// comparisons are returned. Comparisons come back sorted by ordinal.
pub fn test_suite(
    archive: &Path,
    launcher: &dyn BrowserLauncher,
    config: &Config,
    keep: bool,
) -> Result<Vec<Comparison>> {
    let suite = SuiteArchive::read(archive)?;
    let parsed = interpret_all(
        suite
            .scripts
            .iter()
            .map(|s| (s.file_name.as_str(), s.source.as_str())),
    )?;
    if parsed.is_empty() {
        return Err(RegressionError::config("Test suite holds no scripts"));
    }

    let scratch = ScratchDir::create(&config.output.scratch_dir, "test")?.keep(keep);
    let captures = run_scripts(&parsed, launcher, config, &scratch)?;

    let baseline = suite.image_names();
    let candidate: BTreeSet<String> = captures.iter().map(|c| c.key.file_name()).collect();
    if baseline != candidate || captures.len() != candidate.len() {
        return Err(RegressionError::SnapshotSetMismatch { baseline, candidate });
    }

    let mut comparisons = Vec::with_capacity(captures.len());
    for capture in &captures {
        let name = capture.key.file_name();
        let fresh = fs::read(&capture.image_path)?;
        let base = suite
            .images
            .get(&name)
            .ok_or_else(|| RegressionError::InvalidKey(name.clone()))?;
        comparisons.push(compare_png(capture.key.clone(), base, &fresh)?);
    }
    comparisons.sort_by_key(|c| c.key.ordinal);

    if keep {
        info!("candidate images kept in {}", scratch.dir.display());
    }
    info!(
        total = comparisons.len(),
        failed = comparisons.iter().filter(|c| !c.passed()).count(),
        "compared test suite {}",
        archive.display()
    );
    Ok(comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_entries() {
        assert_eq!(classify("0.rcs").unwrap(), EntryKind::Script(0));
        assert_eq!(classify("12.py").unwrap(), EntryKind::Script(12));
        assert_eq!(
            classify("3:login:800x600:1:.png").unwrap(),
            EntryKind::Image(SnapshotKey::new(3, "login", "800x600", 1))
        );
        for name in ["notes.txt", "0.png", "README", "x.rcs", ".rcs", "1:a:b:2.png"] {
            assert!(
                matches!(classify(name), Err(RegressionError::UnknownFiletype(_))),
                "{} should be unknown",
                name
            );
        }
    }

    #[test]
    fn test_entry_name_requires_root() {
        assert_eq!(
            entry_name(Path::new("testsuite_DO_NOT_MODIFY/0.rcs")).unwrap(),
            Some("0.rcs".to_string())
        );
        assert_eq!(entry_name(Path::new("testsuite_DO_NOT_MODIFY")).unwrap(), None);
        assert!(entry_name(Path::new("other/0.rcs")).is_err());
        assert!(entry_name(Path::new("testsuite_DO_NOT_MODIFY/a/0.rcs")).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.tar");

        let mut suite = SuiteArchive::default();
        suite.scripts.push(ArchivedScript {
            index: 1,
            file_name: "1.rcs".into(),
            source: "Test(\"b\")".into(),
        });
        suite.scripts.push(ArchivedScript {
            index: 0,
            file_name: "0.rcs".into(),
            source: "Test(\"a\")".into(),
        });
        suite.images.insert("0:a:default:0:.png".into(), vec![1, 2, 3]);
        suite.write(&path).unwrap();

        let read = SuiteArchive::read(&path).unwrap();
        let names: Vec<&str> = read.scripts.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["0.rcs", "1.rcs"]);
        assert_eq!(read.scripts[1].source, "Test(\"b\")");
        assert_eq!(read.images.get("0:a:default:0:.png"), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_read_rejects_gaps_in_script_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.tar");

        let mut suite = SuiteArchive::default();
        suite.scripts.push(ArchivedScript {
            index: 3,
            file_name: "3.rcs".into(),
            source: "Test()".into(),
        });
        suite.write(&path).unwrap();
        let err = SuiteArchive::read(&path).unwrap_err();
        assert!(matches!(err, RegressionError::Config(_)));
        assert!(err.to_string().contains("found 3.rcs"), "{}", err);

        suite.scripts.insert(
            0,
            ArchivedScript {
                index: 0,
                file_name: "0.cfg".into(),
                source: "Test()".into(),
            },
        );
        suite.write(&path).unwrap();
        assert!(SuiteArchive::read(&path).is_err());
    }

    #[test]
    fn test_read_rejects_unknown_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.tar");
        {
            let file = File::create(&path).unwrap();
            let mut builder = tar::Builder::new(file);
            append_file(&mut builder, "notes.txt", b"hello").unwrap();
            builder.into_inner().unwrap();
        }
        let err = SuiteArchive::read(&path).unwrap_err();
        assert_eq!(err.to_string(), "Unknown filetype: notes.txt");
    }
}
