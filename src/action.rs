//! Scripted browser actions.
//!
//! Actions are plain data built by the script interpreter. They only touch a
//! browser when a [`TestSession`] applies them. [`Action::Group`] is not
//! applied at all: [`expand_paths`] turns a queue holding groups into the
//! linear paths that are actually replayed.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::driver::normalize_url;
use crate::error::{RegressionError, Result};
use crate::runner::TestSession;
use crate::window::{Window, WindowSize};

/// One step of a test
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Load a URL (`http://` is prefixed when no scheme is given)
    Navigate { url: String },

    /// Resize the viewport to the window and make it the current window
    Resize(Window),

    /// Capture the current frame under the next snapshot key
    Snapshot { label: Option<String> },

    /// Sleep
    Wait(Duration),

    /// Poll the console log until a `console.*` message equals `expected`
    AwaitConsoleMessage {
        expected: String,
        timeout: Option<Duration>,
    },

    /// Poll the window geometry until it changes
    AwaitWindowResize { timeout: Option<Duration> },

    /// Fail unless the live viewport matches (defaults: the current window)
    AssertWindowSize {
        width: Option<u32>,
        height: Option<u32>,
    },

    /// Fanout point: the rest of the queue is replayed once per item
    Group(Vec<Action>),
}

impl Action {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Resize(_) => "resize",
            Action::Snapshot { .. } => "snapshot",
            Action::Wait(_) => "wait",
            Action::AwaitConsoleMessage { .. } => "await_console_message",
            Action::AwaitWindowResize { .. } => "await_window_resize",
            Action::AssertWindowSize { .. } => "assert_window_size",
            Action::Group(_) => "group",
        }
    }

    /// Apply this action to the session of the active test
    pub fn apply(&self, session: &mut TestSession<'_>) -> Result<()> {
        debug!(test = session.test_name(), "apply {}", self.kind());
        match self {
            Action::Navigate { url } => session.driver().navigate(&normalize_url(url)),
            Action::Resize(window) => session.resize(window.clone()),
            Action::Snapshot { label } => session.capture(label.as_deref()).map(|_| ()),
            Action::Wait(duration) => {
                thread::sleep(*duration);
                Ok(())
            }
            Action::AwaitConsoleMessage { expected, timeout } => {
                await_console_message(session, expected, *timeout)
            }
            Action::AwaitWindowResize { timeout } => await_window_resize(session, *timeout),
            Action::AssertWindowSize { width, height } => {
                let window = session.window();
                let expected = WindowSize::new(
                    width.unwrap_or(window.width()),
                    height.unwrap_or(window.height()),
                )
                .with_chrome();
                let actual = session
                    .driver()
                    .window_size()?
                    .ok_or(RegressionError::SessionLost)?;
                if actual != expected {
                    return Err(RegressionError::WindowMismatch { expected, actual });
                }
                Ok(())
            }
            Action::Group(_) => Err(RegressionError::config(
                "group actions are fanout points and cannot be applied directly",
            )),
        }
    }
}

/// Expand a queue into the linear paths it replays as.
///
/// Every `Group` multiplies the remainder of the queue by its items, in item
/// order, depth-first: `[A, Group[X, Y], B]` becomes `[A, X, B]`, `[A, Y, B]`.
/// Groups nested inside a group item are expanded the same way.
pub fn expand_paths(queue: &[Action]) -> Vec<Vec<&Action>> {
    let Some((head, rest)) = queue.split_first() else {
        return vec![Vec::new()];
    };
    let heads: Vec<Vec<&Action>> = match head {
        Action::Group(items) => items
            .iter()
            .flat_map(|item| expand_paths(std::slice::from_ref(item)))
            .collect(),
        step => vec![vec![step]],
    };
    let tails = expand_paths(rest);
    heads
        .iter()
        .flat_map(|head| {
            tails
                .iter()
                .map(move |tail| head.iter().chain(tail.iter()).copied().collect())
        })
        .collect()
}

/// Resolve the effective timeout: the action's own, else the configured one
fn deadline(session: &TestSession<'_>, timeout: Option<Duration>) -> Option<(Instant, Duration)> {
    deadline_after(Instant::now(), timeout.or(session.poll().timeout))
}

/// A limit too far out to represent as an `Instant` waits without bound
fn deadline_after(start: Instant, limit: Option<Duration>) -> Option<(Instant, Duration)> {
    let limit = limit?;
    start.checked_add(limit).map(|at| (at, limit))
}

fn check_deadline(deadline: Option<(Instant, Duration)>, what: impl FnOnce() -> String) -> Result<()> {
    match deadline {
        Some((at, limit)) if Instant::now() >= at => Err(RegressionError::PollTimeout {
            what: what(),
            seconds: limit.as_secs_f64(),
        }),
        _ => Ok(()),
    }
}

fn await_console_message(
    session: &mut TestSession<'_>,
    expected: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let deadline = deadline(session, timeout);
    let interval = session.poll().interval;
    loop {
        let entries = session.driver().console_log()?;
        if entries
            .iter()
            .any(|entry| entry.is_console_api() && entry.text() == expected)
        {
            return Ok(());
        }
        check_deadline(deadline, || format!("console message '{}'", expected))?;
        thread::sleep(interval);
    }
}

fn await_window_resize(session: &mut TestSession<'_>, timeout: Option<Duration>) -> Result<()> {
    let deadline = deadline(session, timeout);
    let interval = session.poll().interval;
    let initial = session
        .driver()
        .window_size()?
        .ok_or(RegressionError::SessionLost)?;
    debug!("awaiting window change from {}", initial);
    loop {
        let current = session
            .driver()
            .window_size()?
            .ok_or(RegressionError::SessionLost)?;
        if current != initial {
            return Ok(());
        }
        check_deadline(deadline, || "window resize".to_string())?;
        thread::sleep(interval);
    }
}
