//! SessionKeep Core - shared error, logging, configuration and async utilities
//!
//! Every other crate in the workspace builds on the types defined here.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
