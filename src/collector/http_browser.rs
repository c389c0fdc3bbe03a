//! HTTP-backed headless browser
//!
//! Each tab is a tokio task. The task fetches the page, fires the tab's
//! load-complete signal, and then answers extraction requests by running the
//! page script against the fetched document. Closing a tab aborts its task,
//! which drops the page context and makes later calls unreachable.

use crate::bus::{request_channel, ExtractionRequest, ExtractionResponse, Responder};
use crate::collector::browser::{Browser, PageChannel, TabError, TabHandle, TabId, TabResult};
use crate::collector::page_script::{PageDocument, PageScript};
use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// Result of loading a page
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// The server answered with an error status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Whether the tab finished navigating, even if to an error page
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::NetworkError { .. })
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use group_harvest::config::UserAgentConfig;
/// use group_harvest::collector::build_http_client;
///
/// let config = UserAgentConfig {
///     name: "GroupHarvest".to_string(),
///     version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page the way a tab navigation would
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx with an HTML (or missing) Content-Type | Success |
/// | 2xx with another Content-Type | ContentMismatch |
/// | 4xx / 5xx | HttpError |
/// | Timeout, refused connection, body read failure | NetworkError |
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                "Connection refused".to_string()
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.is_empty() && !content_type.contains("html") {
        return FetchResult::ContentMismatch { content_type };
    }

    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    }
}

struct OpenTab {
    channel: PageChannel,
    task: JoinHandle<()>,
}

/// Browser whose tabs load pages over HTTP and run a `PageScript`
pub struct HttpBrowser {
    client: Client,
    script: Arc<dyn PageScript>,
    next_id: AtomicU64,
    tabs: Mutex<HashMap<TabId, OpenTab>>,
}

impl HttpBrowser {
    pub fn new(client: Client, script: Arc<dyn PageScript>) -> Self {
        Self {
            client,
            script,
            next_id: AtomicU64::new(1),
            tabs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tabs currently open
    pub async fn open_tabs(&self) -> usize {
        self.tabs.lock().await.len()
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    // Headless tabs never take focus, so `active` has no effect
    async fn open_tab(&self, url: &str, _active: bool) -> TabResult<TabHandle> {
        reqwest::Url::parse(url).map_err(|e| TabError::OpenFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let id = TabId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (loaded_tx, loaded_rx) = oneshot::channel();
        let (channel, responder) = request_channel(4);

        let task = tokio::spawn(run_tab(
            id,
            url.to_string(),
            self.client.clone(),
            self.script.clone(),
            loaded_tx,
            responder,
        ));

        self.tabs.lock().await.insert(id, OpenTab { channel, task });

        Ok(TabHandle {
            id,
            url: url.to_string(),
            loaded: loaded_rx,
        })
    }

    async fn connect(&self, tab: TabId) -> TabResult<PageChannel> {
        let tabs = self.tabs.lock().await;
        let open = tabs.get(&tab).ok_or(TabError::NotFound(tab))?;
        if open.task.is_finished() {
            return Err(TabError::InjectFailed {
                tab,
                reason: "page context is gone".to_string(),
            });
        }
        Ok(open.channel.clone())
    }

    async fn close_tab(&self, tab: TabId) -> TabResult<()> {
        if let Some(open) = self.tabs.lock().await.remove(&tab) {
            open.task.abort();
        }
        Ok(())
    }
}

/// Body of one tab: navigate, signal load, then serve the page script
async fn run_tab(
    id: TabId,
    url: String,
    client: Client,
    script: Arc<dyn PageScript>,
    loaded: oneshot::Sender<()>,
    responder: Responder<ExtractionRequest, ExtractionResponse>,
) {
    let fetched = fetch_page(&client, &url).await;

    if fetched.is_loaded() {
        let _ = loaded.send(());
    } else {
        drop(loaded);
    }

    let document = match fetched {
        FetchResult::Success {
            final_url,
            status_code,
            body,
        } => {
            tracing::debug!("{} loaded {} ({})", id, final_url, status_code);
            Ok(PageDocument::new(final_url, body))
        }
        FetchResult::ContentMismatch { content_type } => {
            Err(format!("Page is not HTML ({})", content_type))
        }
        FetchResult::HttpError { status_code } => Err(format!("HTTP {}", status_code)),
        FetchResult::NetworkError { error } => Err(error),
    };

    if let Err(reason) = &document {
        tracing::warn!("{} failed to load {}: {}", id, url, reason);
    }

    responder
        .serve(|request| {
            let response = match &document {
                Ok(document) => script.run(document, &request),
                Err(reason) => ExtractionResponse::failure(reason.clone()),
            };
            async move { response }
        })
        .await;
}
