//! Coordinator-side extraction
//!
//! The extractor never touches the page directly. It sends an extraction
//! request into the page context over the tab's channel and waits, with a
//! timeout, for the page script's answer.

use crate::bus::{BusError, ExtractionRequest};
use crate::collector::browser::TabError;
use crate::collector::tab_session::PageHandle;
use crate::model::ExtractedRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why an extraction produced no records
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The page script ran and reported a failure
    #[error("Page script failed: {0}")]
    Page(String),

    /// The page context could not be reached or did not answer in time
    #[error("Page channel error: {0}")]
    Channel(#[from] BusError),

    #[error("Tab error: {0}")]
    Tab(#[from] TabError),

    /// The run stopped before the page was asked for records
    #[error("Collection stopped before extraction")]
    Stopped,
}

/// Result type for extraction calls
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Produces records from a ready page
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        page: &PageHandle,
        request: ExtractionRequest,
    ) -> ExtractionResult<Vec<ExtractedRecord>>;
}

/// Extractor that calls the page script over the page channel
#[derive(Debug, Clone)]
pub struct BusExtractor {
    timeout: Duration,
}

impl BusExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Extractor for BusExtractor {
    async fn extract(
        &self,
        page: &PageHandle,
        request: ExtractionRequest,
    ) -> ExtractionResult<Vec<ExtractedRecord>> {
        let response = page.channel.request(&request, self.timeout).await?;
        response.into_result().map_err(ExtractionError::Page)
    }
}
