//! Collector module: everything that turns a queue of targets into records
//!
//! This module contains the collection pipeline, including:
//! - Pacing between visits
//! - Scoped background tabs with a single-tab limit
//! - The extraction call into the page context and the page script itself
//! - The run state machine and its command service

mod browser;
mod control;
mod coordinator;
mod extractor;
mod http_browser;
mod page_script;
mod rate_limiter;
mod simulated;
mod tab_session;

pub use browser::{Browser, PageChannel, TabError, TabHandle, TabId, TabResult};
pub use control::ControlService;
pub use coordinator::{CollectionCoordinator, CoordinatorBuilder, Step};
pub use extractor::{BusExtractor, ExtractionError, ExtractionResult, Extractor};
pub use http_browser::{build_http_client, fetch_page, FetchResult, HttpBrowser};
pub use page_script::{
    split_timestamp, HtmlPageScript, PageDocument, PageScript, DEFAULT_CONTAINER_SELECTORS,
};
pub use rate_limiter::{BurstCooldownPolicy, DelayRange, FixedDelayPolicy, RateLimitPolicy};
pub use simulated::simulate_records;
pub use tab_session::{PageHandle, TabOptions, TabSession, TabSlot};
