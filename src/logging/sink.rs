use crate::bus::Subscription;
use crate::logging::LogRing;
use crate::model::LogEntry;
use crate::storage::{RunStore, StorageResult};
use std::sync::{Arc, Mutex};

/// Persistent destination for log entries from every context
///
/// Entries arrive over the bus log stream and are kept in a bounded ring that
/// is written back to storage under the `extensionLogs` key.
#[derive(Clone)]
pub struct LogSink {
    ring: Arc<Mutex<LogRing>>,
    store: RunStore,
    // Orders storage writes so a flush never lands after a clear
    persist: Arc<tokio::sync::Mutex<()>>,
}

impl LogSink {
    /// Loads previously persisted entries into a ring of `capacity`
    pub async fn restore(store: RunStore, capacity: usize) -> StorageResult<Self> {
        let persisted = store.load_logs().await?;
        Ok(Self {
            ring: Arc::new(Mutex::new(LogRing::from_entries(capacity, persisted))),
            store,
            persist: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Appends an entry to the in-memory ring without persisting it
    pub fn append(&self, entry: LogEntry) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.push(entry);
        }
    }

    /// Current entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.ring.lock().map(|r| r.to_vec()).unwrap_or_default()
    }

    /// Writes the ring back to storage
    pub async fn flush(&self) -> StorageResult<()> {
        let _guard = self.persist.lock().await;
        let entries = self.entries();
        self.store.save_logs(&entries).await
    }

    /// Drops every entry, in memory and in storage
    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.persist.lock().await;
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
        self.store.clear_logs().await
    }

    /// Drains `subscription` into the ring until the stream closes
    ///
    /// Entries that arrive together are persisted with a single write.
    pub async fn run(self, mut subscription: Subscription<LogEntry>) {
        while let Some(entry) = subscription.recv().await {
            self.append(entry);
            while let Some(more) = subscription.try_recv() {
                self.append(more);
            }
            if let Err(e) = self.flush().await {
                // Not logged through tracing: that would feed back into this sink
                eprintln!("failed to persist log entries: {}", e);
            }
        }
        let _ = self.flush().await;
    }
}
