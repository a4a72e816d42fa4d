//! WebDriver connection configuration.

use std::time::Duration;

use crate::error::{BrowserError, BrowserResult};

/// Headroom between the longest page-side wait and the session script timeout.
pub const SCRIPT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Settings for attaching to an existing WebDriver session.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Driver endpoint, e.g. `http://localhost:9515`
    pub base_url: String,
    /// Id of the session already driving the monitored page
    pub session_id: String,
    /// Script timeout installed on the session at attach time. Async scripts
    /// resolve on their own timers first; see [`cover_waits`](Self::cover_waits).
    pub script_timeout: Duration,
    /// Interval at which buffered mutations are drained from the page
    pub watch_poll_interval: Duration,
}

impl WebDriverConfig {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            script_timeout: Duration::from_secs(30) + SCRIPT_TIMEOUT_MARGIN,
            watch_poll_interval: Duration::from_millis(500),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> BrowserResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BrowserResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let session_id = var("WEBDRIVER_SESSION_ID")
            .ok_or_else(|| BrowserError::config("WEBDRIVER_SESSION_ID not set"))?;
        let base_url = var("WEBDRIVER_URL").unwrap_or_else(|| "http://localhost:9515".to_string());

        let watch_poll_ms = match var("LASTFRAME_WATCH_POLL_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                BrowserError::config(format!("LASTFRAME_WATCH_POLL_MS: invalid value '{}': {}", raw, e))
            })?,
            None => 500,
        };

        Ok(Self {
            watch_poll_interval: Duration::from_millis(watch_poll_ms.max(10)),
            ..Self::new(base_url, session_id)
        })
    }

    /// Size the script timeout to the longest page-side wait.
    ///
    /// Async scripts arm their own timer for the wait they perform, so the
    /// session-wide timeout only has to cover the longest of them.
    pub fn cover_waits(&mut self, longest_wait: Duration) {
        self.script_timeout = longest_wait + SCRIPT_TIMEOUT_MARGIN;
    }

    /// HTTP request timeout: the script timeout plus headroom for transport.
    pub fn request_timeout(&self) -> Duration {
        self.script_timeout + Duration::from_secs(10)
    }
}
