//! Run status report
//!
//! This module summarizes a stored collection run for the terminal.

use crate::model::{CollectionRun, ItemFailure, LogEntry, RunStatus};
use crate::output::OutputResult;
use crate::storage::RunStore;
use chrono::{DateTime, Utc};

/// Summary of one collection run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,

    /// Targets processed so far
    pub processed: usize,

    /// Targets in the queue
    pub total: usize,

    pub records: usize,

    /// Comments across all records
    pub comments: usize,

    pub failures: Vec<ItemFailure>,

    /// Name of the next target, if the run can continue
    pub next_target: Option<String>,

    pub resumable: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn from_run(run: &CollectionRun) -> Self {
        Self {
            status: run.status(),
            processed: run.cursor(),
            total: run.queue().len(),
            records: run.records().len(),
            comments: run.records().iter().map(|r| r.comments.len()).sum(),
            failures: run.failures().to_vec(),
            next_target: run.current_target().map(|t| t.name.clone()),
            resumable: run.is_resumable(),
            started_at: run.started_at(),
            finished_at: run.finished_at(),
        }
    }

    /// Duration of a finished run in seconds
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_seconds()),
            _ => None,
        }
    }

    /// Targets that produced records
    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.failures.len())
    }
}

/// Loads the report for the stored run
///
/// # Returns
///
/// * `Ok(Some(RunReport))` - A run is stored
/// * `Ok(None)` - Nothing has been collected yet
/// * `Err(OutputError)` - Failed to read storage
pub async fn load_report(store: &RunStore) -> OutputResult<Option<RunReport>> {
    Ok(store.load_run().await?.map(|run| RunReport::from_run(&run)))
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &RunReport) {
    println!("=== Collection Run ===\n");

    println!("Overview:");
    println!("  Status: {}", report.status);
    println!("  Targets processed: {} / {}", report.processed, report.total);
    println!("  Records collected: {}", report.records);
    println!("  Comments collected: {}", report.comments);
    if let Some(started) = report.started_at {
        println!("  Started: {}", started.to_rfc3339());
    }
    if let Some(finished) = report.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    if let Some(seconds) = report.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!();

    if !report.failures.is_empty() {
        println!("Failed Targets ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  - {}: {}", failure.target_id, failure.message);
        }
        println!();
    }

    if report.resumable {
        if let Some(next) = &report.next_target {
            println!("Run was interrupted; resume continues with '{}'", next);
            println!();
        }
    }

    let success_rate = if report.processed > 0 {
        (report.succeeded() as f64 / report.processed as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} targets yielded records)",
        success_rate,
        report.succeeded(),
        report.processed
    );
}

/// Prints log entries oldest first
pub fn print_logs(entries: &[LogEntry]) {
    if entries.is_empty() {
        println!("No log entries");
        return;
    }

    for entry in entries {
        match &entry.context {
            Some(context) => println!("{} ({})", entry, context),
            None => println!("{}", entry),
        }
    }
}
