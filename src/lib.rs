//! Group-Harvest: a paced collector for group pages
//!
//! This crate drives a queue of target groups through background tabs, runs a
//! page-side extraction script in each one, and accumulates the extracted posts
//! into a checkpointed collection run that survives restarts.

pub mod bus;
pub mod collector;
pub mod config;
pub mod logging;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Group-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid collection input: {0}")]
    Model(#[from] ModelError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Message bus error: {0}")]
    Bus(#[from] bus::BusError),

    #[error("Tab error: {0}")]
    Tab(#[from] collector::TabError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] collector::ExtractionError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(#[from] ModelError),
}

/// Errors raised when targets, settings or a stored run break the data model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Target has an empty id")]
    EmptyTargetId,

    #[error("Duplicate target id: {0}")]
    DuplicateTarget(String),

    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Cannot derive a group id from URL: {0}")]
    MissingGroupId(String),

    #[error("items_per_target must be greater than zero")]
    ZeroItemsPerTarget,

    #[error("Cursor {cursor} is past the end of a queue of {len}")]
    CursorOutOfRange { cursor: usize, len: usize },
}

/// Result type alias for Group-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for data model checks
pub type ModelResult<T> = std::result::Result<T, ModelError>;

// Re-export commonly used types
pub use collector::CollectionCoordinator;
pub use config::Config;
pub use model::{CollectionRun, CollectionSettings, ExtractedRecord, RunStatus, Target};
