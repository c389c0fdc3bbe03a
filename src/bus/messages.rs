//! Message shapes exchanged between the coordinator, page contexts and the
//! control surface

use crate::model::{CollectionRun, CollectionSettings, ExtractedRecord, LogEntry, RunStatus, Target};
use serde::{Deserialize, Serialize};

/// Commands sent by the control surface to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    StartCollection {
        targets: Vec<Target>,
        settings: CollectionSettings,
    },
    StopCollection,
    Resume,
    ExportResults,
    GetStatus,
    GetLogs,
    ClearLogs,
}

/// Replies returned for a `Command`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandReply {
    Ack(CommandAck),
    Export { bytes: Vec<u8> },
    Status { run: CollectionRun },
    Logs { entries: Vec<LogEntry> },
}

/// Outcome of a state-changing command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Events streamed from the coordinator to whoever is listening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CollectionEvent {
    Progress {
        target_index: usize,
        total: usize,
        target_name: String,
        percent: u8,
    },
    ItemFailed {
        target_id: String,
        error_message: String,
    },
    /// The queue is exhausted; `failed_items` counts targets that yielded nothing
    Completed {
        records: Vec<ExtractedRecord>,
        failed_items: usize,
    },
    Failed {
        error_message: String,
    },
    StatusChanged {
        status: RunStatus,
    },
}

/// Parameters sent to the page context with each extraction call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub items_per_target: u32,
    pub include_secondary: bool,
}

impl From<&CollectionSettings> for ExtractionRequest {
    fn from(settings: &CollectionSettings) -> Self {
        Self {
            items_per_target: settings.items_per_target,
            include_secondary: settings.include_secondary,
        }
    }
}

/// Page context reply: `{success: true, records}` or `{success: false, error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<ExtractedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResponse {
    pub fn success(records: Vec<ExtractedRecord>) -> Self {
        Self {
            success: true,
            records,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Converts the wire shape into a `Result`
    pub fn into_result(self) -> Result<Vec<ExtractedRecord>, String> {
        if self.success {
            Ok(self.records)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "extraction failed without a message".to_string()))
        }
    }
}
