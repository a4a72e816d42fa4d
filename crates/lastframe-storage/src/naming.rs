//! Deterministic object naming.
//!
//! Frames are stored as `final_frame_<identity>.png`. Raw-source identities
//! can be arbitrary URLs, so anything that is not a short run of safe
//! characters gets a sanitized prefix plus a SHA-256 suffix instead. Two
//! different identities never share a name and the same identity always maps
//! to the same name.

use lastframe_models::{ResourceIdentity, SourceScope};
use sha2::{Digest, Sha256};

/// File name prefix for stored frames.
pub const FRAME_PREFIX: &str = "final_frame_";

/// File extension for stored frames.
pub const FRAME_EXTENSION: &str = "png";

const MAX_SAFE_LEN: usize = 128;
const SANITIZED_PREFIX_LEN: usize = 48;
const HASH_HEX_LEN: usize = 32;

/// Object name under which the frame for `identity` is stored.
pub fn frame_object_name(identity: &ResourceIdentity) -> String {
    format!("{}{}.{}", FRAME_PREFIX, safe_component(identity.as_str()), FRAME_EXTENSION)
}

/// File-system safe key for a ledger scope.
pub fn scope_key(scope: &SourceScope) -> String {
    safe_component(scope.as_str())
}

/// Whether `s` can be used verbatim in a file name or object key.
pub fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_SAFE_LEN
        && !s.starts_with('.')
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn safe_component(s: &str) -> String {
    if is_safe_component(s) {
        return s.to_string();
    }

    let sanitized: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(SANITIZED_PREFIX_LEN)
        .collect();

    let digest = Sha256::digest(s.as_bytes());
    let hash: String = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(HASH_HEX_LEN)
        .collect();

    format!("{}_{}", sanitized.trim_matches('_'), hash)
}
