//! regrecss - visual regression testing for web pages.
//!
//! This crate provides:
//! - A small script language describing tests as queues of browser actions
//! - Fanout groups that replay the rest of a test once per alternative
//! - Deterministic snapshot keys joining baseline and candidate images
//! - Tar test suites bundling scripts with their baseline images
//! - A strict pixel diff engine with highlight overlays
//! - Console, HTML and JSON reports
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//! use regrecss::{Config, MockLauncher, create_suite, test_suite};
//!
//! let config = Config::defaults();
//! let launcher = MockLauncher::default();
//! let scripts = vec![PathBuf::from("login.rcs")];
//! create_suite(&scripts, Path::new("suite.tar"), &launcher, &config).unwrap();
//! let comparisons = test_suite(Path::new("suite.tar"), &launcher, &config, false).unwrap();
//! assert!(comparisons.iter().all(|c| c.passed()));
//! ```

pub mod action;
pub mod archive;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod report;
pub mod runner;
pub mod scratch;
pub mod script;
pub mod snapshot;
pub mod window;

// Re-export the suite workflow
pub use archive::{ARCHIVE_ROOT, SuiteArchive, create_suite, test_suite};

// Re-export core types
pub use action::{Action, expand_paths};
pub use config::{Config, DriverKind};
pub use diff::{Comparison, compare, compare_png};
pub use error::{RegressionError, Result};
pub use runner::{Runner, TestSession};
pub use script::{Interpreter, Script, TestDefinition};
pub use snapshot::{CapturedSnapshot, SnapshotKey};
pub use window::{GUI_HEIGHT, GUI_WIDTH, Window, WindowSize};

// Re-export drivers
pub use driver::{
    BrowserDriver, BrowserLauncher, MockBrowserConfig, MockLauncher, WebDriverLauncher, launcher_from_config,
};

// Re-export reports
pub use report::{Summary, console_report, html_report, write_html_report};
