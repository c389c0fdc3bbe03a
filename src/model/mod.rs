//! Data model for collection runs
//!
//! This module defines the values that flow through a collection run.
//!
//! # Components
//!
//! - `Target`: a group identity queued for visiting
//! - `CollectionSettings`: per-run extraction parameters
//! - `ExtractedRecord` / `Comment`: posts produced by the page script
//! - `CollectionRun`: the checkpointed aggregate root driven by the coordinator
//! - `LogEntry`: a single line in the bounded operator log

mod log_entry;
mod record;
mod run;
mod target;

pub use log_entry::{LogEntry, LogLevel};
pub use record::{Comment, ExtractedRecord};
pub use run::{CollectionRun, ItemFailure, RunStatus};
pub use target::{group_id_from_url, validate_queue, CollectionSettings, Target};
