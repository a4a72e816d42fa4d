//! Shared data models for the lastframe pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Resource identity derivation from video `src` attributes
//! - Video descriptors and opaque node handles
//! - Ledger records and captured frames
//! - Extraction stages
//! - Container locators and ledger scopes

pub mod descriptor;
pub mod frame;
pub mod identity;
pub mod locator;
pub mod record;
pub mod stage;

// Re-export common types
pub use descriptor::{NodeHandle, VideoResourceDescriptor};
pub use frame::CapturedFrame;
pub use identity::{derive_identity, IdentityDerivation, IdentityFallback, ResourceIdentity, STREAM_PREFIX};
pub use locator::{ContainerLocator, SourceScope, DEFAULT_CONTAINER_XPATH};
pub use record::{ProcessedRecord, RecordOutcome};
pub use stage::ExtractionStage;
