//! Orgdir - An organizational directory management system
//!
//! This crate provides the hierarchical core of the Orgdir directory
//! service: departments arranged in a materialized-path tree, with move and
//! soft-delete cascades kept consistent under store-level subtree locking.

use tracing_subscriber::{fmt, EnvFilter};

pub mod cascade;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod path;
pub mod service;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use error::{HierarchyError, HierarchyResult};
pub use service::HierarchyService;

/// Initialize logging for binaries and tests
/// Priority: RUST_LOG env var > config level > default "info"
pub fn init_logging(config: &config::LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let _ = fmt::fmt().with_env_filter(env_filter).with_target(true).try_init();
}
