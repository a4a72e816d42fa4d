//! Browser error types.

use lastframe_media::BridgeError;
use lastframe_models::NodeHandle;
use thiserror::Error;

/// Result type for WebDriver operations.
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors from talking to the WebDriver endpoint.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether the driver reported that an element reference is no longer
    /// attached to the document.
    pub fn is_stale_element(&self) -> bool {
        matches!(
            self,
            BrowserError::WebDriver { error, .. }
                if error == "stale element reference" || error == "no such element"
        )
    }

    /// Whether the session or window the client is bound to is gone.
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            BrowserError::WebDriver { error, .. }
                if error == "invalid session id" || error == "no such window"
        )
    }

    /// Convert to a bridge error for calls made against `node`.
    pub fn into_bridge(self, node: Option<&NodeHandle>) -> BridgeError {
        match (&self, node) {
            (e, Some(node)) if e.is_stale_element() => BridgeError::StaleNode(node.clone()),
            (BrowserError::WebDriver { .. }, _) => BridgeError::script(self.to_string()),
            (BrowserError::Network(_) | BrowserError::Status { .. }, _) => {
                BridgeError::transport(self.to_string())
            }
            _ => BridgeError::protocol(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_error(code: &str) -> BrowserError {
        BrowserError::WebDriver {
            error: code.to_string(),
            message: "details".to_string(),
        }
    }

    #[test]
    fn test_stale_element_maps_to_stale_node() {
        let node = NodeHandle::from_string("el-1");
        assert_eq!(
            driver_error("stale element reference").into_bridge(Some(&node)),
            BridgeError::StaleNode(node)
        );
    }

    #[test]
    fn test_script_errors_map_to_script() {
        assert!(matches!(
            driver_error("javascript error").into_bridge(None),
            BridgeError::Script(_)
        ));
        assert!(matches!(
            BrowserError::invalid_response("no value").into_bridge(None),
            BridgeError::Protocol(_)
        ));
    }

    #[test]
    fn test_session_lost() {
        assert!(driver_error("invalid session id").is_session_lost());
        assert!(!driver_error("javascript error").is_session_lost());
    }
}
