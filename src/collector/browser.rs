//! Browser seam: opening, connecting to and closing tabs
//!
//! The coordinator only ever talks to a tab through this trait, so the bundled
//! HTTP-backed browser and the fakes used in tests are interchangeable.

use crate::bus::{BusError, ExtractionRequest, ExtractionResponse, Requester};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

/// Identifier of an open tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Request channel into the page context of one tab
pub type PageChannel = Requester<ExtractionRequest, ExtractionResponse>;

/// A freshly opened tab
///
/// `loaded` fires once when the page finishes loading. It may never fire; the
/// sender is dropped if the tab dies first.
#[derive(Debug)]
pub struct TabHandle {
    pub id: TabId,
    pub url: String,
    pub loaded: oneshot::Receiver<()>,
}

/// Errors from tab lifecycle operations
#[derive(Debug, Error)]
pub enum TabError {
    #[error("Failed to open tab for {url}: {reason}")]
    OpenFailed { url: String, reason: String },

    #[error("No such tab: {0}")]
    NotFound(TabId),

    #[error("Could not inject the page script into {tab}: {reason}")]
    InjectFailed { tab: TabId, reason: String },

    #[error("The tab slot is closed")]
    SlotClosed,

    #[error("Page channel error: {0}")]
    Channel(#[from] BusError),
}

/// Result type for tab operations
pub type TabResult<T> = Result<T, TabError>;

/// Something that can open background tabs and run the page script in them
#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens `url` in a new tab; `active` false keeps it in the background
    async fn open_tab(&self, url: &str, active: bool) -> TabResult<TabHandle>;

    /// Injects the page script and returns a channel into the page context
    async fn connect(&self, tab: TabId) -> TabResult<PageChannel>;

    /// Closes the tab
    ///
    /// Closing a tab that is already gone is not an error.
    async fn close_tab(&self, tab: TabId) -> TabResult<()>;
}
