//! Host media bridge and last-frame extraction.
//!
//! This crate provides:
//! - The narrow bridge traits the pipeline consumes from the host document
//! - The per-item extraction state machine (ready, seek, capture, encode)
//! - PNG encoding of captured pixel buffers
//! - An in-process fake document for tests (feature `testing`)

pub mod bridge;
pub mod encode;
pub mod error;
pub mod extractor;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{
    AddedNode, AdditionReceiver, BridgeError, BridgeResult, DocumentBridge, MediaBridge,
    PixelBuffer, ReadyState,
};
pub use encode::{decode_image, encode_png};
pub use error::{ExtractionFailure, MediaError, MediaResult};
pub use extractor::{ExtractorConfig, FrameExtractor};
