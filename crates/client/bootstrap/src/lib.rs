//! Shared bootstrap utilities for client front-ends.
//!
//! Provides environment configuration, logging setup, and session assembly
//! that any front-end can reuse.
pub mod builder;
pub mod config;
pub mod dirs;
pub mod logging;

pub use builder::{SessionBootstrap, SessionSetup};
pub use config::ClientConfig;
pub use logging::setup_logging;
