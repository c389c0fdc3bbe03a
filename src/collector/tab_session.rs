//! Scoped tab sessions
//!
//! A session owns the single tab permit for as long as its tab is open. The
//! tab is closed on every exit path: explicitly through `release`, or from
//! `Drop` when a session is abandoned mid-flight.

use crate::collector::browser::{Browser, PageChannel, TabError, TabId, TabResult};
use crate::config::TabConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Timing applied while a tab comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabOptions {
    /// Upper bound on the wait for the load-complete signal
    pub load_timeout: Duration,

    /// Extra wait after load so client-rendered content can populate
    pub settle_delay: Duration,
}

impl TabOptions {
    /// No settle delay and a short load timeout
    pub fn immediate() -> Self {
        Self {
            load_timeout: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
        }
    }
}

impl From<&TabConfig> for TabOptions {
    fn from(config: &TabConfig) -> Self {
        Self {
            load_timeout: config.load_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

impl Default for TabOptions {
    fn default() -> Self {
        Self::from(&TabConfig::default())
    }
}

/// The system-wide allowance of one open tab
#[derive(Debug, Clone)]
pub struct TabSlot {
    semaphore: Arc<Semaphore>,
}

impl TabSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Returns true while a session holds the slot
    pub fn in_use(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    async fn take(&self) -> TabResult<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TabError::SlotClosed)
    }
}

impl Default for TabSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// What the extractor gets to work with once a tab is ready
#[derive(Debug, Clone)]
pub struct PageHandle {
    pub tab: TabId,
    pub url: String,
    pub channel: PageChannel,

    /// False when the load signal never arrived and the handle is best-effort
    pub loaded: bool,
}

/// An open tab holding the tab slot
pub struct TabSession {
    browser: Arc<dyn Browser>,
    tab: Option<TabId>,
    url: String,
    permit: Option<OwnedSemaphorePermit>,
    loaded: Option<tokio::sync::oneshot::Receiver<()>>,
}

impl TabSession {
    /// Takes the tab slot and opens `url` in a background tab
    ///
    /// The returned session is not ready yet; call `ready` to wait for the
    /// page. Waits while another session holds the slot.
    pub async fn open(browser: Arc<dyn Browser>, slot: &TabSlot, url: &str) -> TabResult<Self> {
        let permit = slot.take().await?;
        let handle = browser.open_tab(url, false).await?;
        tracing::debug!("Opened {} for {}", handle.id, url);

        Ok(Self {
            browser,
            tab: Some(handle.id),
            url: handle.url,
            permit: Some(permit),
            loaded: Some(handle.loaded),
        })
    }

    pub fn tab(&self) -> Option<TabId> {
        self.tab
    }

    /// Waits for the load signal, applies the settle delay and connects
    ///
    /// A missing load signal is tolerated: the handle is returned best-effort
    /// and extraction is left to fail on its own.
    pub async fn ready(&mut self, options: &TabOptions) -> TabResult<PageHandle> {
        let tab = self.tab.ok_or(TabError::SlotClosed)?;

        let loaded = match self.loaded.take() {
            Some(signal) => match tokio::time::timeout(options.load_timeout, signal).await {
                Ok(Ok(())) => true,
                Ok(Err(_)) => {
                    tracing::warn!("{} went away before signalling load", tab);
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        "{} did not finish loading within {:?}, continuing anyway",
                        tab,
                        options.load_timeout
                    );
                    false
                }
            },
            None => false,
        };

        if loaded && !options.settle_delay.is_zero() {
            tokio::time::sleep(options.settle_delay).await;
        }

        let channel = self.browser.connect(tab).await?;

        Ok(PageHandle {
            tab,
            url: self.url.clone(),
            channel,
            loaded,
        })
    }

    /// Closes the tab and frees the slot
    pub async fn release(mut self) -> TabResult<()> {
        let result = match self.tab.take() {
            Some(tab) => {
                let result = self.browser.close_tab(tab).await;
                tracing::debug!("Closed {}", tab);
                result
            }
            None => Ok(()),
        };
        self.permit.take();
        result
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        let Some(tab) = self.tab.take() else {
            return;
        };
        let browser = self.browser.clone();
        let permit = self.permit.take();

        // The slot stays held until the abandoned tab is actually closed
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = browser.close_tab(tab).await {
                        tracing::warn!("Failed to close abandoned {}: {}", tab, e);
                    }
                    drop(permit);
                });
            }
            Err(_) => tracing::warn!("No runtime to close abandoned {}", tab),
        }
    }
}
