//! Runs interpreted tests against browser sessions.
//!
//! One [`Runner`] covers one create or test run. It owns the global snapshot
//! ordinal, so every script executed through the same runner continues the
//! same numbering. Tests run strictly one after another and each gets a
//! fresh browser session that is closed before the next one opens.

use std::fs;

use tracing::{debug, info};

use crate::action::expand_paths;
use crate::config::PollSettings;
use crate::driver::{BrowserDriver, BrowserLauncher};
use crate::error::{RegressionError, Result};
use crate::scratch::ScratchDir;
use crate::script::{Script, TestDefinition};
use crate::snapshot::{CapturedSnapshot, SnapshotKey};
use crate::window::Window;

/// Executes scripts and collects the snapshots they capture
pub struct Runner<'a> {
    launcher: &'a dyn BrowserLauncher,
    poll: PollSettings,
    scratch: &'a ScratchDir,
    next_ordinal: u64,
    captures: Vec<CapturedSnapshot>,
}

impl<'a> Runner<'a> {
    pub fn new(launcher: &'a dyn BrowserLauncher, poll: PollSettings, scratch: &'a ScratchDir) -> Self {
        Self {
            launcher,
            poll,
            scratch,
            next_ordinal: 0,
            captures: Vec::new(),
        }
    }

    /// Run every test of a script in order
    pub fn run_script(&mut self, script: &Script) -> Result<()> {
        for test in &script.tests {
            self.run_test(test)?;
        }
        Ok(())
    }

    /// Open a session for one test, replay every fanout path, close the session
    pub fn run_test(&mut self, test: &TestDefinition) -> Result<()> {
        info!(test = %test.name, driver = self.launcher.name(), "starting test");
        let driver = self.launcher.launch()?;
        let mut session = TestSession::open(driver, &test.name, self)?;

        // The session is closed even when replay fails; the replay error wins.
        let result = session.replay(test);
        let closed = session.close();
        result.and(closed)
    }

    pub fn into_captures(self) -> Vec<CapturedSnapshot> {
        self.captures
    }
}

/// The browser session of the active test
pub struct TestSession<'r> {
    driver: Box<dyn BrowserDriver>,
    test_name: String,
    default_window: Window,
    window: Window,
    next_local: u64,
    poll: PollSettings,
    scratch: &'r ScratchDir,
    next_ordinal: &'r mut u64,
    captures: &'r mut Vec<CapturedSnapshot>,
}

impl<'r> TestSession<'r> {
    /// Install the session's current geometry as the `default` window
    fn open<'a>(
        mut driver: Box<dyn BrowserDriver>,
        test_name: &str,
        runner: &'r mut Runner<'a>,
    ) -> Result<Self> {
        let size = match driver.window_size() {
            Ok(Some(size)) => size,
            Ok(None) => {
                let _ = driver.quit();
                return Err(RegressionError::SessionLost);
            }
            Err(e) => {
                let _ = driver.quit();
                return Err(e);
            }
        };
        let default_window = Window::default_for(size.without_chrome());
        debug!(test = test_name, "default window {}", size);
        Ok(Self {
            driver,
            test_name: test_name.to_string(),
            window: default_window.clone(),
            default_window,
            next_local: 0,
            poll: runner.poll.clone(),
            scratch: runner.scratch,
            next_ordinal: &mut runner.next_ordinal,
            captures: &mut runner.captures,
        })
    }

    fn replay(&mut self, test: &TestDefinition) -> Result<()> {
        let paths = expand_paths(&test.actions);
        debug!(test = %test.name, paths = paths.len(), "replaying action queue");
        for (index, path) in paths.iter().enumerate() {
            if index > 0 {
                self.reset_window()?;
            }
            for action in path {
                action.apply(self)?;
            }
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        debug!(test = %self.test_name, "closing session");
        self.driver.quit()
    }

    /// Back to the geometry the session started with
    fn reset_window(&mut self) -> Result<()> {
        let window = self.default_window.clone();
        self.resize(window)
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// The window snapshots are currently attributed to
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn poll(&self) -> &PollSettings {
        &self.poll
    }

    pub fn driver(&mut self) -> &mut dyn BrowserDriver {
        self.driver.as_mut()
    }

    /// Resize the browser so its viewport matches `window`, and make it current
    pub fn resize(&mut self, window: Window) -> Result<()> {
        self.driver.set_window_size(window.outer_size())?;
        self.window = window;
        Ok(())
    }

    /// Capture the current frame under the next snapshot key
    pub fn capture(&mut self, label: Option<&str>) -> Result<CapturedSnapshot> {
        let key = SnapshotKey::new(
            *self.next_ordinal,
            self.test_name.as_str(),
            self.window.name(),
            self.next_local,
        );
        *self.next_ordinal += 1;
        self.next_local += 1;

        let png = self.driver.screenshot()?;
        let path = self.scratch.image_path(&key);
        fs::write(&path, &png)?;
        debug!(key = %key, label = label.unwrap_or(""), bytes = png.len(), "captured snapshot");

        let snapshot = CapturedSnapshot::new(key, label.map(str::to_string), path);
        self.captures.push(snapshot.clone());
        Ok(snapshot)
    }
}
