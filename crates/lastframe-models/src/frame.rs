//! Captured frames.

use crate::identity::ResourceIdentity;

/// An encoded still image produced by the frame extractor.
///
/// Owned by the handoff between extraction and the output sink and dropped
/// once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Identity of the video the frame was taken from
    pub identity: ResourceIdentity,
    /// PNG-encoded image bytes
    pub png: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl CapturedFrame {
    /// Content type of the encoded bytes.
    pub const CONTENT_TYPE: &'static str = "image/png";

    /// Size of the encoded image in bytes.
    pub fn len(&self) -> usize {
        self.png.len()
    }

    pub fn is_empty(&self) -> bool {
        self.png.is_empty()
    }
}
