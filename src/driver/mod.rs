//! Browser driver abstraction.
//!
//! The harness never talks to a browser directly. It goes through:
//! - [`BrowserLauncher`], which opens a fresh session per test
//! - [`BrowserDriver`], the live session
//!
//! Implementations:
//! - `WebDriverLauncher` for chromedriver over the W3C WebDriver protocol
//! - `MockLauncher` for tests and dry runs

pub mod mock;
pub mod webdriver;

use crate::config::{Config, DriverKind};
use crate::error::Result;
use crate::window::WindowSize;

pub use mock::{DriverEvent, MockBrowserConfig, MockFramebuffer, MockLauncher};
pub use webdriver::{WebDriverConfig, WebDriverLauncher, WebDriverSession};

/// Console log source tag of messages emitted through `console.*` calls
pub const CONSOLE_API_SOURCE: &str = "console-api";

/// One entry of the browser console log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    /// Source tag (e.g. "console-api", "network", "javascript")
    pub source: String,
    /// Raw message as reported by the driver
    pub message: String,
}

impl ConsoleEntry {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Whether this entry was produced by a `console.*` call in the page
    pub fn is_console_api(&self) -> bool {
        self.source == CONSOLE_API_SOURCE
    }

    /// The logged text with the driver's location prefix stripped
    pub fn text(&self) -> &str {
        decode_console_message(&self.message)
    }
}

/// Strip the location prefix chromedriver puts in front of console messages.
///
/// `http://host/app.js 12:8 "ready"` decodes to `ready`: everything after the
/// first quote, minus the final character. Messages without a quote are
/// returned unchanged.
pub fn decode_console_message(raw: &str) -> &str {
    match raw.split_once('"') {
        Some((_, rest)) => {
            let mut chars = rest.chars();
            chars.next_back();
            chars.as_str()
        }
        None => raw,
    }
}

/// A live browser session
pub trait BrowserDriver {
    /// Load a URL (already normalized)
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Set the outer window geometry
    fn set_window_size(&mut self, size: WindowSize) -> Result<()>;

    /// Read the outer window geometry; `None` when the session no longer reports one
    fn window_size(&mut self) -> Result<Option<WindowSize>>;

    /// Capture the current frame as PNG bytes
    fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Drain new console log entries
    fn console_log(&mut self) -> Result<Vec<ConsoleEntry>>;

    /// Terminate the session
    fn quit(&mut self) -> Result<()>;
}

/// Opens browser sessions
pub trait BrowserLauncher {
    /// Start a brand-new session
    fn launch(&self) -> Result<Box<dyn BrowserDriver>>;

    /// Identifier used in logs (e.g. "webdriver", "mock")
    fn name(&self) -> &str;
}

/// Build the launcher selected by the configuration
pub fn launcher_from_config(config: &Config) -> Box<dyn BrowserLauncher> {
    match config.driver.kind {
        DriverKind::Webdriver => Box::new(WebDriverLauncher::new(WebDriverConfig::from_config(config))),
        DriverKind::Mock => Box::new(MockLauncher::new(MockBrowserConfig::default())),
    }
}

/// Prefix `http://` unless the URL already names a scheme
pub fn normalize_url(url: &str) -> String {
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// `scheme:` prefix (ASCII letter, then letters, digits, `+`, `-` or `.`).
/// A `host:port` pair is not a scheme.
fn has_scheme(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return false;
    }
    if rest.starts_with("//") {
        return true;
    }
    let port = rest.split(['/', '?', '#']).next().unwrap_or_default();
    port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit())
}
