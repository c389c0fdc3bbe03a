/// Collection run aggregate and its status lifecycle
///
/// The run is the unit that gets checkpointed. Its fields are private so the
/// cursor can only move forward and records can only be appended.
use crate::model::{CollectionSettings, ExtractedRecord, Target};
use crate::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a collection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No run is active (never started, stopped, or interrupted)
    Idle,

    /// The processing loop is working through the queue
    Running,

    /// A stop was requested; the current item is being wound down
    Stopping,

    /// Every target has been processed
    Completed,

    /// The run hit an unrecoverable error
    Failed,
}

impl RunStatus {
    /// Returns true while a run owns the processing loop
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    /// Returns true for statuses that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "stopping" => Some(Self::Stopping),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A non-fatal failure recorded against one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub target_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One end-to-end execution of the collection queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRun {
    status: RunStatus,
    queue: Vec<Target>,
    cursor: usize,
    settings: CollectionSettings,
    accumulated_records: Vec<ExtractedRecord>,
    #[serde(default)]
    failures: Vec<ItemFailure>,
    #[serde(default)]
    config_hash: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl CollectionRun {
    /// An idle placeholder with no queue
    pub fn idle() -> Self {
        Self {
            status: RunStatus::Idle,
            queue: Vec::new(),
            cursor: 0,
            settings: CollectionSettings::default(),
            accumulated_records: Vec::new(),
            failures: Vec::new(),
            config_hash: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Starts a fresh run over `queue` with the cursor at zero
    pub fn begin(
        queue: Vec<Target>,
        settings: CollectionSettings,
        config_hash: Option<String>,
    ) -> Self {
        Self {
            status: RunStatus::Running,
            queue,
            settings,
            config_hash,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn queue(&self) -> &[Target] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.accumulated_records
    }

    pub fn failures(&self) -> &[ItemFailure] {
        &self.failures
    }

    pub fn config_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The next unprocessed target, if any
    pub fn current_target(&self) -> Option<&Target> {
        self.queue.get(self.cursor)
    }

    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Share of the queue already processed, floored to a whole percent
    pub fn percent(&self) -> u8 {
        if self.queue.is_empty() {
            return 100;
        }
        ((self.cursor * 100) / self.queue.len()) as u8
    }

    /// Returns true when a stopped or interrupted run still has targets left
    pub fn is_resumable(&self) -> bool {
        self.status == RunStatus::Idle && self.started_at.is_some() && !self.is_exhausted()
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Appends records in extraction order
    pub fn append_records(&mut self, records: Vec<ExtractedRecord>) {
        self.accumulated_records.extend(records);
    }

    pub fn record_failure(&mut self, target_id: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ItemFailure {
            target_id: target_id.into(),
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Moves the cursor past the current target
    ///
    /// The cursor never decreases and never passes the end of the queue.
    pub fn advance(&mut self) -> usize {
        if self.cursor < self.queue.len() {
            self.cursor += 1;
        }
        self.cursor
    }

    /// Turns a run persisted mid-flight into an idle, resumable one
    ///
    /// Returns true if the run had been interrupted.
    pub fn normalize_interrupted(&mut self) -> bool {
        if self.status.is_active() {
            self.status = RunStatus::Idle;
            true
        } else {
            false
        }
    }

    /// Checks the structural invariants of a run loaded from storage
    pub fn check_invariants(&self) -> ModelResult<()> {
        if self.cursor > self.queue.len() {
            return Err(ModelError::CursorOutOfRange {
                cursor: self.cursor,
                len: self.queue.len(),
            });
        }
        Ok(())
    }
}

impl Default for CollectionRun {
    fn default() -> Self {
        Self::idle()
    }
}
