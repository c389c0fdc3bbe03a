//! Configuration module for Group-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use group_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Collecting {} posts per group", config.collection.items_per_target);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CollectionConfig, Config, OutputConfig, RateLimitConfig, StorageConfig, TabConfig,
    TargetEntry, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
