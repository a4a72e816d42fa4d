//! Container locators and ledger scopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// XPath of the message list container on the monitored page.
pub const DEFAULT_CONTAINER_XPATH: &str = "/html/body/div[2]/div/div[4]/div/div";

/// Structural path to the container whose subtree is watched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerLocator(pub String);

impl ContainerLocator {
    pub fn xpath(xpath: impl Into<String>) -> Self {
        Self(xpath.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContainerLocator {
    fn default() -> Self {
        Self(DEFAULT_CONTAINER_XPATH.to_string())
    }
}

impl fmt::Display for ContainerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the monitored source a ledger belongs to.
///
/// Ledgers of different scopes never see each other's records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceScope(pub String);

impl SourceScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SourceScope {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for SourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
