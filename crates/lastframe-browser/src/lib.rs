//! WebDriver bridge to a live browser page.
//!
//! This crate provides:
//! - A minimal W3C WebDriver client that attaches to an existing session
//! - [`WebDriverBridge`], implementing the document and media bridge traits
//!   with injected scripts
//! - Mutation buffering in the page, drained on a poll interval

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod scripts;

pub use bridge::WebDriverBridge;
pub use client::{WebDriverClient, ELEMENT_KEY};
pub use config::WebDriverConfig;
pub use error::{BrowserError, BrowserResult};
