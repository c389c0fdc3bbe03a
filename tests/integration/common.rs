//! Shared fakes for the integration tests

use async_trait::async_trait;
use group_harvest::bus::{
    request_channel, CollectionEvent, EventStream, ExtractionRequest, ExtractionResponse,
};
use group_harvest::collector::{
    Browser, CollectionCoordinator, CoordinatorBuilder, ExtractionError, ExtractionResult,
    Extractor, FixedDelayPolicy, PageChannel, PageHandle, TabHandle, TabId, TabOptions, TabResult,
};
use group_harvest::model::{CollectionSettings, ExtractedRecord, Target};
use group_harvest::storage::RunStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Browser whose tabs load instantly and which tracks how many are open
#[derive(Default)]
pub struct FakeBrowser {
    next_id: AtomicU64,
    open: Mutex<HashSet<TabId>>,
    max_open: AtomicUsize,
    visited: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn open_now(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn is_open(&self, tab: TabId) -> bool {
        self.open.lock().unwrap().contains(&tab)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_tab(&self, url: &str, active: bool) -> TabResult<TabHandle> {
        assert!(!active, "collection tabs must open in the background");

        let id = TabId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = {
            let mut open = self.open.lock().unwrap();
            open.insert(id);
            open.len()
        };
        self.max_open.fetch_max(now, Ordering::SeqCst);
        self.visited.lock().unwrap().push(url.to_string());

        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Ok(TabHandle {
            id,
            url: url.to_string(),
            loaded: rx,
        })
    }

    async fn connect(&self, _tab: TabId) -> TabResult<PageChannel> {
        let (requester, _responder) = request_channel::<ExtractionRequest, ExtractionResponse>(1);
        Ok(requester)
    }

    async fn close_tab(&self, tab: TabId) -> TabResult<()> {
        self.open.lock().unwrap().remove(&tab);
        Ok(())
    }
}

/// Extractor yielding one record whose content is the page URL
///
/// Pages whose URL contains "broken" fail. `delay` simulates a slow page.
#[derive(Default)]
pub struct EchoExtractor {
    pub delay: Duration,
}

#[async_trait]
impl Extractor for EchoExtractor {
    async fn extract(
        &self,
        page: &PageHandle,
        request: ExtractionRequest,
    ) -> ExtractionResult<Vec<ExtractedRecord>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if page.url.contains("broken") {
            return Err(ExtractionError::Page("No posts found".to_string()));
        }
        assert!(request.items_per_target > 0);

        Ok(vec![ExtractedRecord {
            target_id: String::new(),
            poster_id: "poster".to_string(),
            poster_name: "Poster".to_string(),
            date: "July 10".to_string(),
            time: "3:45 PM".to_string(),
            content: page.url.clone(),
            comments: vec![],
        }])
    }
}

/// Extractor that stays on the page until `limit` passes or its tab is closed
///
/// A closed tab surfaces as a page error, the way a real content script
/// loses its connection.
pub struct TabBoundExtractor {
    pub browser: Arc<FakeBrowser>,
    pub limit: Duration,
}

#[async_trait]
impl Extractor for TabBoundExtractor {
    async fn extract(
        &self,
        page: &PageHandle,
        _request: ExtractionRequest,
    ) -> ExtractionResult<Vec<ExtractedRecord>> {
        let deadline = tokio::time::Instant::now() + self.limit;
        while tokio::time::Instant::now() < deadline {
            if !self.browser.is_open(page.tab) {
                return Err(ExtractionError::Page("tab closed".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Ok(vec![ExtractedRecord {
            target_id: String::new(),
            poster_id: "poster".to_string(),
            poster_name: "Poster".to_string(),
            date: "July 10".to_string(),
            time: "3:45 PM".to_string(),
            content: page.url.clone(),
            comments: vec![],
        }])
    }
}

pub fn targets(ids: &[&str]) -> Vec<Target> {
    ids.iter()
        .map(|id| Target::new(*id, format!("Group {}", id), format!("https://example.com/groups/{}/", id)))
        .collect()
}

pub fn settings() -> CollectionSettings {
    CollectionSettings {
        items_per_target: 10,
        include_secondary: true,
        use_simulated_data: false,
    }
}

/// A coordinator with no pacing and no settle delay
pub fn fast_builder(
    browser: Arc<FakeBrowser>,
    extractor: EchoExtractor,
    store: RunStore,
    events: EventStream<CollectionEvent>,
) -> CoordinatorBuilder {
    CollectionCoordinator::builder(browser, Arc::new(extractor), store, events)
        .rate_limit(FixedDelayPolicy::none())
        .tab_options(TabOptions::immediate())
}
