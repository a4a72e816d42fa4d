//! Resource identity derivation.
//!
//! Streaming video elements carry their real identity inside the `src`
//! attribute: `stream/<percent-encoded JSON>`, where the JSON holds a
//! `location.access_hash`. The same logical video can show up under many DOM
//! nodes (and many blob URLs), but the access hash stays stable, so it is the
//! key used for deduplication. Anything that does not follow that shape is
//! identified by its raw `src` string.
//!
//! The payload comes straight from the page and is treated as hostile input:
//! derivation is total and never panics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Prefix marking a streaming source with an embedded JSON payload.
pub const STREAM_PREFIX: &str = "stream/";

/// Stable identity of a video resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(pub String);

impl ResourceIdentity {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Why the raw source was used as the identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityFallback {
    #[error("source does not start with the stream prefix")]
    NotStreamSource,

    #[error("invalid percent-encoding: {0}")]
    PercentDecode(String),

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload has no location.access_hash")]
    MissingAccessHash,

    #[error("location.access_hash has unsupported type {0}")]
    UnsupportedAccessHash(&'static str),
}

impl IdentityFallback {
    /// Whether the fallback was caused by a malformed payload.
    ///
    /// Plain non-stream sources and payloads without an access hash are
    /// ordinary; decode and parse failures are worth a warning.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            IdentityFallback::PercentDecode(_)
                | IdentityFallback::Json(_)
                | IdentityFallback::UnsupportedAccessHash(_)
        )
    }
}

/// Result of deriving an identity from a raw source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDerivation {
    /// The derived identity.
    pub identity: ResourceIdentity,
    /// Set when the raw source was used verbatim.
    pub fallback: Option<IdentityFallback>,
}

/// Derive the identity of a video resource from its `src` attribute.
///
/// Returns the embedded access hash for well-formed stream sources and the raw
/// source otherwise. Deterministic and free of side effects.
pub fn derive_identity(raw_source: &str) -> IdentityDerivation {
    match access_hash(raw_source) {
        Ok(hash) => IdentityDerivation {
            identity: ResourceIdentity(hash),
            fallback: None,
        },
        Err(reason) => IdentityDerivation {
            identity: ResourceIdentity(raw_source.to_string()),
            fallback: Some(reason),
        },
    }
}

fn access_hash(raw_source: &str) -> Result<String, IdentityFallback> {
    let encoded = raw_source
        .strip_prefix(STREAM_PREFIX)
        .ok_or(IdentityFallback::NotStreamSource)?;

    let decoded = percent_decode_strict(encoded)?;
    let payload: Value =
        serde_json::from_str(&decoded).map_err(|e| IdentityFallback::Json(e.to_string()))?;

    let hash = payload
        .get("location")
        .and_then(|location| location.get("access_hash"))
        .ok_or(IdentityFallback::MissingAccessHash)?;

    match hash {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Ok(n.to_string()),
        Value::Null | Value::String(_) | Value::Number(_) | Value::Bool(false) => {
            Err(IdentityFallback::MissingAccessHash)
        }
        Value::Bool(true) => Err(IdentityFallback::UnsupportedAccessHash("boolean")),
        Value::Array(_) => Err(IdentityFallback::UnsupportedAccessHash("array")),
        Value::Object(_) => Err(IdentityFallback::UnsupportedAccessHash("object")),
    }
}

/// Percent-decode, rejecting truncated or non-hex escapes and invalid UTF-8.
fn percent_decode_strict(encoded: &str) -> Result<String, IdentityFallback> {
    let bytes = encoded.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return Err(IdentityFallback::PercentDecode(format!(
                    "malformed escape at byte {}",
                    i
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(encoded)
        .map(|cow| cow.into_owned())
        .map_err(|e| IdentityFallback::PercentDecode(e.to_string()))
}
