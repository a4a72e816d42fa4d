//! Minimal W3C WebDriver client.
//!
//! Only the endpoints the bridge needs: script execution and session
//! timeouts. The client attaches to a session someone else created and never
//! deletes it.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::config::WebDriverConfig;
use crate::error::{BrowserError, BrowserResult};

/// JSON key identifying a web element reference.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver client bound to one session.
#[derive(Clone)]
pub struct WebDriverClient {
    http: Client,
    session_url: Url,
}

impl WebDriverClient {
    pub fn new(config: &WebDriverConfig) -> BrowserResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("lastframe-browser/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base = config.base_url.trim_end_matches('/');
        let session_url = Url::parse(&format!("{}/session/{}/", base, config.session_id))?;

        Ok(Self { http, session_url })
    }

    /// Attach to the configured session and install the script timeout.
    pub async fn attach(config: &WebDriverConfig) -> BrowserResult<Self> {
        let client = Self::new(config)?;
        client
            .set_script_timeout(config.script_timeout.as_millis() as u64)
            .await?;
        info!(session = %config.session_id, "Attached to WebDriver session");
        Ok(client)
    }

    pub async fn set_script_timeout(&self, millis: u64) -> BrowserResult<()> {
        self.post("timeouts", json!({ "script": millis })).await?;
        Ok(())
    }

    /// Run a synchronous script and return its value.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> BrowserResult<Value> {
        self.post("execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// Run an asynchronous script; resolves when the script calls its
    /// completion callback.
    pub async fn execute_async(&self, script: &str, args: Vec<Value>) -> BrowserResult<Value> {
        self.post("execute/async", json!({ "script": script, "args": args }))
            .await
    }

    async fn post(&self, endpoint: &str, body: Value) -> BrowserResult<Value> {
        let url = self.session_url.join(endpoint)?;
        debug!("POST {}", url);

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let payload: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) if !status.is_success() => {
                return Err(BrowserError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let value = payload
            .get("value")
            .cloned()
            .ok_or_else(|| BrowserError::invalid_response("response has no value"))?;

        if !status.is_success() {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Err(match error {
                Some(error) => BrowserError::WebDriver {
                    error,
                    message: value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                None => BrowserError::Status {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        Ok(value)
    }
}

/// Wrap an element id as a script argument.
pub fn element_arg(id: &str) -> Value {
    json!({ ELEMENT_KEY: id })
}

/// Extract the element id from a returned element reference.
pub fn element_id(value: &Value) -> Option<&str> {
    value.get(ELEMENT_KEY).and_then(Value::as_str)
}
