//! Structured per-item logging.
//!
//! Provides consistent lifecycle messages for one queue item with the
//! session, identity and attempt attached to every event.

use tracing::{error, info, warn, Span};

use lastframe_models::ResourceIdentity;

/// Item logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    session_id: String,
    identity: String,
    attempt: u32,
}

impl ItemLogger {
    pub fn new(session_id: &str, identity: &ResourceIdentity, attempt: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            identity: identity.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            identity = %self.identity,
            attempt = self.attempt,
            "Item started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            identity = %self.identity,
            attempt = self.attempt,
            "Item warning: {}", message
        );
    }

    /// Log a failure in `stage`.
    pub fn log_error(&self, stage: &str, message: &str) {
        error!(
            session_id = %self.session_id,
            identity = %self.identity,
            attempt = self.attempt,
            stage = %stage,
            "Item failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            identity = %self.identity,
            attempt = self.attempt,
            "Item completed: {}", message
        );
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Create a tracing span for this item.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "item",
            session_id = %self.session_id,
            identity = %self.identity,
            attempt = self.attempt
        )
    }
}
