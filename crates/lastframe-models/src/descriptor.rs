//! Video descriptors and node handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, non-owning reference to a node in the host document.
///
/// The document controls the node's lifetime; a handle may go stale at any
/// time and bridge calls on it are expected to fail rather than panic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub String);

impl NodeHandle {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A video element observed in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResourceDescriptor {
    /// Handle to the live video element
    pub node: NodeHandle,
    /// The element's `src` attribute at observation time
    pub raw_source: Option<String>,
}

impl VideoResourceDescriptor {
    pub fn new(node: NodeHandle, raw_source: Option<String>) -> Self {
        Self { node, raw_source }
    }

    /// The source attribute, if present and non-empty.
    ///
    /// Videos without a usable source are not candidates for extraction.
    pub fn source(&self) -> Option<&str> {
        self.raw_source.as_deref().filter(|s| !s.is_empty())
    }
}
