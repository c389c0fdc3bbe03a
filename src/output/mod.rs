//! Output module for exporting results and reporting on runs
//!
//! This module handles:
//! - Exporting accumulated records as CSV
//! - Summarizing the stored run for the terminal
//! - Printing the persisted operator log

mod csv;
mod report;

pub use csv::{records_to_csv, write_csv, CSV_HEADER};
pub use report::{load_report, print_logs, print_report, RunReport};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised while producing output
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read the stored run: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
