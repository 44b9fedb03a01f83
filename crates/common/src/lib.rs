//! camkit common utilities
//!
//! Shared infrastructure for all camkit crates:
//! - Error types and result aliases
//! - Recording clock used to time video takes
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
