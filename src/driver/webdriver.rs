//! W3C WebDriver client for chromedriver.
//!
//! Requests are sent with `curl` and exchanged as JSON. Only the handful of
//! endpoints the harness needs are implemented:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | new session | `POST /session` |
//! | navigate | `POST /session/{id}/url` |
//! | geometry | `GET`/`POST /session/{id}/window/rect` |
//! | screenshot | `GET /session/{id}/screenshot` |
//! | console log | `POST /session/{id}/se/log` |
//! | quit | `DELETE /session/{id}` |

use base64::Engine;
use serde_json::{Value, json};
use std::process::Command;
use tracing::{debug, warn};

use super::{BrowserDriver, BrowserLauncher, ConsoleEntry};
use crate::config::Config;
use crate::error::{RegressionError, Result};
use crate::window::WindowSize;

/// W3C error codes meaning the session or its window is gone
const SESSION_GONE_ERRORS: &[&str] = &["invalid session id", "no such window", "session not created"];

/// Connection settings for a chromedriver endpoint
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Base URL of the driver (e.g. `http://127.0.0.1:9515`)
    pub endpoint: String,
    /// Timeout for establishing a connection (seconds)
    pub connect_timeout: u64,
    /// Extra Chrome command line switches
    pub browser_args: Vec<String>,
}

impl WebDriverConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.driver.webdriver_url.clone(),
            connect_timeout: config.driver.connect_timeout,
            browser_args: vec!["--disable-infobars".to_string()],
        }
    }

    pub fn browser_arg(mut self, arg: impl Into<String>) -> Self {
        self.browser_args.push(arg.into());
        self
    }

    /// Capabilities sent when creating a session
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.browser_args },
                    "goog:loggingPrefs": { "browser": "ALL" }
                }
            }
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    /// Send one request and unwrap the W3C `value` member
    fn request(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        let timeout = self.connect_timeout.to_string();
        let mut cmd = Command::new("curl");
        cmd.args(["-s", "-S", "-X", method, &url, "--connect-timeout", &timeout]);
        if let Some(body) = body {
            cmd.args(["-H", "Content-Type: application/json", "-d", &body.to_string()]);
        }

        debug!("webdriver {} {}", method, path);
        let output = cmd
            .output()
            .map_err(|e| RegressionError::driver(format!("failed to run curl: {}", e)))?;
        if !output.status.success() {
            return Err(RegressionError::driver(format!(
                "{} {} failed: {}",
                method,
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_response(&output.stdout)
    }
}

/// Launches chromedriver sessions
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    config: WebDriverConfig,
}

impl WebDriverLauncher {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

impl BrowserLauncher for WebDriverLauncher {
    fn launch(&self) -> Result<Box<dyn BrowserDriver>> {
        let value = self
            .config
            .request("POST", "/session", Some(&self.config.capabilities()))?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| RegressionError::driver("new session response has no sessionId"))?
            .to_string();
        debug!("webdriver session {} started", session_id);
        Ok(Box::new(WebDriverSession {
            config: self.config.clone(),
            session_id,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "webdriver"
    }
}

/// A live chromedriver session; quit on drop if still open
pub struct WebDriverSession {
    config: WebDriverConfig,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }
}

impl BrowserDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.config
            .request("POST", &self.path("/url"), Some(&json!({ "url": url })))?;
        Ok(())
    }

    fn set_window_size(&mut self, size: WindowSize) -> Result<()> {
        let body = json!({ "width": size.width, "height": size.height });
        self.config
            .request("POST", &self.path("/window/rect"), Some(&body))?;
        Ok(())
    }

    fn window_size(&mut self) -> Result<Option<WindowSize>> {
        match self.config.request("GET", &self.path("/window/rect"), None) {
            Ok(value) => Ok(parse_rect(&value)),
            Err(RegressionError::Driver(msg)) if is_session_gone(&msg) => {
                debug!("webdriver session {} is gone: {}", self.session_id, msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn screenshot(&mut self) -> Result<Vec<u8>> {
        let value = self.config.request("GET", &self.path("/screenshot"), None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| RegressionError::driver("screenshot response is not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RegressionError::driver(format!("screenshot is not valid base64: {}", e)))
    }

    fn console_log(&mut self) -> Result<Vec<ConsoleEntry>> {
        let value = self
            .config
            .request("POST", &self.path("/se/log"), Some(&json!({ "type": "browser" })))?;
        Ok(parse_log_entries(&value))
    }

    fn quit(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.config.request("DELETE", &self.path(""), None)?;
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.quit() {
                warn!("failed to close webdriver session {}: {}", self.session_id, e);
            }
        }
    }
}

/// Unwrap a W3C response body, turning `{"value": {"error": ..}}` into an error
pub fn parse_response(body: &[u8]) -> Result<Value> {
    let mut response: Value = serde_json::from_slice(body)?;
    let value = response
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| RegressionError::driver("response has no 'value' member"))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(RegressionError::driver(format!("{}: {}", error, message)));
    }
    Ok(value)
}

/// Extract width/height from a window rect; `None` if the rect is incomplete
pub fn parse_rect(value: &Value) -> Option<WindowSize> {
    let width = value.get("width")?.as_f64()?;
    let height = value.get("height")?.as_f64()?;
    Some(WindowSize::new(width as u32, height as u32))
}

/// Convert chromedriver log entries into console entries
pub fn parse_log_entries(value: &Value) -> Vec<ConsoleEntry> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    ConsoleEntry::new(
                        entry["source"].as_str().unwrap_or_default(),
                        entry["message"].as_str().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_session_gone(msg: &str) -> bool {
    SESSION_GONE_ERRORS.iter().any(|code| msg.starts_with(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_value() {
        let value = parse_response(br#"{"value": {"sessionId": "abc"}}"#).unwrap();
        assert_eq!(value["sessionId"], "abc");
    }

    #[test]
    fn test_parse_response_error() {
        let err = parse_response(br#"{"value": {"error": "invalid session id", "message": "gone"}}"#)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid session id: gone"));
    }

    #[test]
    fn test_parse_response_null_value() {
        assert_eq!(parse_response(br#"{"value": null}"#).unwrap(), Value::Null);
        assert!(parse_response(br#"{"status": 0}"#).is_err());
    }

    #[test]
    fn test_parse_rect() {
        let rect = json!({"x": 0, "y": 0, "width": 810, "height": 686});
        assert_eq!(parse_rect(&rect), Some(WindowSize::new(810, 686)));
        assert_eq!(parse_rect(&json!({})), None);
    }

    #[test]
    fn test_parse_log_entries() {
        let value = json!([
            {"level": "INFO", "source": "console-api", "message": "http://x/ 1:1 \"ready\"", "timestamp": 1},
            {"level": "SEVERE", "source": "network", "message": "404", "timestamp": 2}
        ]);
        let entries = parse_log_entries(&value);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_console_api());
        assert_eq!(entries[0].text(), "ready");
        assert!(!entries[1].is_console_api());
    }

    #[test]
    fn test_session_gone_detection() {
        assert!(is_session_gone("invalid session id: session deleted"));
        assert!(is_session_gone("no such window: target window already closed"));
        assert!(!is_session_gone("unknown error: boom"));
    }

    #[test]
    fn test_capabilities_request_browser_logs() {
        let config = WebDriverConfig::from_config(&Config::defaults()).browser_arg("--headless");
        let caps = config.capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["goog:loggingPrefs"]["browser"], "ALL");
        assert_eq!(always["goog:chromeOptions"]["args"][1], "--headless");
    }
}
