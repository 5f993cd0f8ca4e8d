//! Error handling
//!
//! Defines the repository failure taxonomy and how failures are reported.

pub mod handlers;
pub mod types;

pub use handlers::log_failure;
pub use types::*;
