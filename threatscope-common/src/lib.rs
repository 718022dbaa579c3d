//! # Threatscope Common Library
//!
//! Shared code for the threatscope service crates:
//! - Wire event types (SSE envelope and payload shapes)
//! - Error types
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
