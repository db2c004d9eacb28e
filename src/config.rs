//! Configuration management with environment variable support.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `REGRECSS_WEBDRIVER_URL` | chromedriver endpoint | `http://127.0.0.1:9515` |
//! | `REGRECSS_DRIVER` | Browser driver (`webdriver` or `mock`) | `webdriver` |
//! | `REGRECSS_POLL_INTERVAL_MS` | Polling interval of await actions (ms) | `100` |
//! | `REGRECSS_POLL_TIMEOUT` | Timeout of await actions (seconds, unset = wait forever) | unset |
//! | `REGRECSS_SCRATCH_DIR` | Base directory for scratch capture directories | `<tmp>/regrecss` |
//! | `REGRECSS_REPORT` | Path of the HTML report | `report.html` next to the archive |
//!
//! # Example
//!
//! ```bash
//! export REGRECSS_WEBDRIVER_URL="http://localhost:4444"
//! export REGRECSS_POLL_TIMEOUT=30
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default chromedriver endpoint
pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

/// Default polling interval for await actions (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default connection timeout for driver requests (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default name of the HTML report
pub const DEFAULT_REPORT_NAME: &str = "report.html";

/// Directory name under the system temp dir used for scratch captures
pub const DEFAULT_SCRATCH_SUBDIR: &str = "regrecss";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the WebDriver endpoint
pub const ENV_WEBDRIVER_URL: &str = "REGRECSS_WEBDRIVER_URL";

/// Environment variable selecting the driver kind
pub const ENV_DRIVER: &str = "REGRECSS_DRIVER";

/// Environment variable for the polling interval
pub const ENV_POLL_INTERVAL_MS: &str = "REGRECSS_POLL_INTERVAL_MS";

/// Environment variable for the polling timeout
pub const ENV_POLL_TIMEOUT: &str = "REGRECSS_POLL_TIMEOUT";

/// Environment variable for the scratch base directory
pub const ENV_SCRATCH_DIR: &str = "REGRECSS_SCRATCH_DIR";

/// Environment variable for the HTML report path
pub const ENV_REPORT: &str = "REGRECSS_REPORT";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Which browser driver runs the scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DriverKind {
    /// W3C WebDriver (chromedriver)
    Webdriver,
    /// In-memory mock browser, for dry runs
    Mock,
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webdriver" | "chrome" => Ok(DriverKind::Webdriver),
            "mock" => Ok(DriverKind::Mock),
            other => Err(format!("Unknown driver '{}'. Use: webdriver or mock", other)),
        }
    }
}

/// Centralized configuration for regrecss
#[derive(Debug, Clone)]
pub struct Config {
    /// Browser driver settings
    pub driver: DriverSettings,
    /// Await-action polling settings
    pub polling: PollSettings,
    /// Output locations
    pub output: OutputSettings,
}

/// Browser driver settings
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Driver implementation
    pub kind: DriverKind,
    /// WebDriver endpoint URL
    pub webdriver_url: String,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
}

/// Polling behaviour of `await_*` actions
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Delay between two polls
    pub interval: Duration,
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

/// Output locations
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Base directory for scratch capture directories
    pub scratch_dir: PathBuf,
    /// Explicit HTML report path (default: next to the archive)
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            driver: DriverSettings::from_env(),
            polling: PollSettings::from_env(),
            output: OutputSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            driver: DriverSettings::defaults(),
            polling: PollSettings::defaults(),
            output: OutputSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DriverSettings {
    pub fn from_env() -> Self {
        Self {
            kind: env::var(ENV_DRIVER)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DriverKind::Webdriver),
            webdriver_url: env::var(ENV_WEBDRIVER_URL)
                .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn defaults() -> Self {
        Self {
            kind: DriverKind::Webdriver,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl PollSettings {
    pub fn from_env() -> Self {
        Self {
            interval: env::var(ENV_POLL_INTERVAL_MS)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            timeout: env::var(ENV_POLL_TIMEOUT)
                .ok()
                .and_then(|s| parse_seconds(&s)),
        }
    }

    pub fn defaults() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: None,
        }
    }
}

impl OutputSettings {
    pub fn from_env() -> Self {
        Self {
            scratch_dir: env::var(ENV_SCRATCH_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_scratch_dir()),
            report_path: env::var(ENV_REPORT).ok().map(PathBuf::from),
        }
    }

    pub fn defaults() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            report_path: None,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join(DEFAULT_SCRATCH_SUBDIR)
}

/// Parse a non-negative number of seconds ("30", "2.5")
pub fn parse_seconds(s: &str) -> Option<Duration> {
    let secs: f64 = s.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_seconds("2.5"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("-1"), None);
        assert_eq!(parse_seconds("soon"), None);
        assert_eq!(parse_seconds("inf"), None);
        assert_eq!(parse_seconds("1e20"), None);
        assert_eq!(parse_seconds("1e12"), Some(Duration::from_secs(1_000_000_000_000)));
    }

    #[test]
    fn test_driver_kind_from_str() {
        assert_eq!("mock".parse::<DriverKind>(), Ok(DriverKind::Mock));
        assert_eq!("WebDriver".parse::<DriverKind>(), Ok(DriverKind::Webdriver));
        assert!("firefox".parse::<DriverKind>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.driver.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert_eq!(config.driver.kind, DriverKind::Webdriver);
        assert_eq!(config.polling.interval, Duration::from_millis(100));
        assert_eq!(config.polling.timeout, None);
        assert!(config.output.scratch_dir.ends_with(DEFAULT_SCRATCH_SUBDIR));
    }
}
