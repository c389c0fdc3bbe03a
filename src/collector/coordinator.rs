//! Collection coordinator - the run state machine
//!
//! The coordinator owns the `CollectionRun` and is the only thing that
//! mutates it. It drives the queue one target at a time:
//!
//! 1. Halt if the run is no longer `Running`
//! 2. Emit a progress event
//! 3. Wait for the rate limiter's delay
//! 4. Open a background tab and wait for it to load
//! 5. Ask the page script for records
//! 6. Close the tab
//! 7. Advance the cursor and checkpoint the run
//! 8. Complete once the queue is exhausted
//!
//! Per-item failures are recorded and skipped; only invalid input or a
//! corrupted stored run puts the run into `Failed`.

use crate::bus::{CollectionEvent, CommandAck, EventStream, ExtractionRequest};
use crate::collector::browser::{Browser, TabId};
use crate::collector::extractor::{ExtractionError, Extractor};
use crate::collector::rate_limiter::{BurstCooldownPolicy, RateLimitPolicy};
use crate::collector::simulated::simulate_records;
use crate::collector::tab_session::{TabOptions, TabSession, TabSlot};
use crate::model::{validate_queue, CollectionRun, CollectionSettings, ExtractedRecord, RunStatus, Target};
use crate::output::records_to_csv;
use crate::storage::{RunStore, StorageError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Outcome of one `process_next` tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An item was processed and more remain
    Continue,

    /// The loop should stop; carries the status it stopped in
    Halted(RunStatus),
}

struct State {
    run: CollectionRun,
    active_tab: Option<TabId>,
    driving: bool,
}

struct Inner {
    state: Mutex<State>,
    slot: TabSlot,
    browser: Arc<dyn Browser>,
    extractor: Arc<dyn Extractor>,
    rate_limit: Arc<dyn RateLimitPolicy>,
    store: RunStore,
    events: EventStream<CollectionEvent>,
    tab_options: TabOptions,
    config_hash: Option<String>,
    stop_signal: Notify,
    persist_lock: tokio::sync::Mutex<()>,
}

/// Builder for a `CollectionCoordinator`
pub struct CoordinatorBuilder {
    browser: Arc<dyn Browser>,
    extractor: Arc<dyn Extractor>,
    store: RunStore,
    events: EventStream<CollectionEvent>,
    rate_limit: Arc<dyn RateLimitPolicy>,
    tab_options: TabOptions,
    config_hash: Option<String>,
}

impl CoordinatorBuilder {
    /// Replaces the default pacing policy
    pub fn rate_limit(mut self, policy: impl RateLimitPolicy + 'static) -> Self {
        self.rate_limit = Arc::new(policy);
        self
    }

    pub fn tab_options(mut self, options: TabOptions) -> Self {
        self.tab_options = options;
        self
    }

    /// Hash of the configuration new runs are started from
    pub fn config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Builds a coordinator with an idle, empty run
    pub fn build(self) -> CollectionCoordinator {
        self.build_with(CollectionRun::idle())
    }

    /// Builds a coordinator from the run persisted in storage
    ///
    /// A run found `Running` or `Stopping` was interrupted and comes back
    /// `Idle` with its cursor and records intact, ready to resume. A stored
    /// run that cannot be read or breaks its invariants comes back `Failed`.
    pub async fn restore(self) -> CollectionCoordinator {
        let (run, rewrite) = match self.store.load_run().await {
            Ok(Some(mut run)) => match run.check_invariants() {
                Ok(()) => {
                    let interrupted = run.normalize_interrupted();
                    if interrupted {
                        tracing::info!(
                            "Found interrupted run at target {}/{}, resumable",
                            run.cursor(),
                            run.queue().len()
                        );
                    }
                    if let (Some(stored), Some(current)) = (run.config_hash(), &self.config_hash) {
                        if stored != current {
                            tracing::warn!("Configuration changed since the stored run was started");
                        }
                    }
                    (run, interrupted)
                }
                Err(e) => {
                    tracing::error!("Stored run is inconsistent: {}", e);
                    run.set_status(RunStatus::Failed);
                    (run, true)
                }
            },
            Ok(None) => {
                tracing::debug!("No stored run found");
                (CollectionRun::idle(), false)
            }
            Err(StorageError::Serialization { key, message }) => {
                tracing::error!("Stored run under '{}' is corrupted: {}", key, message);
                let mut run = CollectionRun::idle();
                run.set_status(RunStatus::Failed);
                (run, false)
            }
            Err(e) => {
                tracing::warn!("Could not load the stored run: {}", e);
                (CollectionRun::idle(), false)
            }
        };

        let coordinator = self.build_with(run);
        if rewrite {
            coordinator.checkpoint().await;
        }
        coordinator
    }

    fn build_with(self, run: CollectionRun) -> CollectionCoordinator {
        CollectionCoordinator {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    run,
                    active_tab: None,
                    driving: false,
                }),
                slot: TabSlot::new(),
                browser: self.browser,
                extractor: self.extractor,
                rate_limit: self.rate_limit,
                store: self.store,
                events: self.events,
                tab_options: self.tab_options,
                config_hash: self.config_hash,
                stop_signal: Notify::new(),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

/// Drives collection runs; cheap to clone, every clone shares the same run
#[derive(Clone)]
pub struct CollectionCoordinator {
    inner: Arc<Inner>,
}

/// Clears the driving flag if a `run_to_end` future is dropped mid-run
struct DriveGuard<'a> {
    coordinator: &'a CollectionCoordinator,
    armed: bool,
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.state().driving = false;
        }
    }
}

impl CollectionCoordinator {
    /// Starts building a coordinator around its collaborators
    ///
    /// # Arguments
    ///
    /// * `browser` - Opens and closes tabs
    /// * `extractor` - Produces records from a ready tab
    /// * `store` - Where the run is checkpointed
    /// * `events` - Stream that progress and status events are published on
    pub fn builder(
        browser: Arc<dyn Browser>,
        extractor: Arc<dyn Extractor>,
        store: RunStore,
        events: EventStream<CollectionEvent>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            browser,
            extractor,
            store,
            events,
            rate_limit: Arc::new(BurstCooldownPolicy::default()),
            tab_options: TabOptions::default(),
            config_hash: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current run
    pub fn snapshot(&self) -> CollectionRun {
        self.state().run.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.state().run.status()
    }

    pub fn records(&self) -> Vec<ExtractedRecord> {
        self.state().run.records().to_vec()
    }

    /// Returns true while a tab is open for the current item
    pub fn has_active_tab(&self) -> bool {
        self.state().active_tab.is_some()
    }

    /// Serializes the accumulated records as CSV
    pub fn export_csv(&self) -> Vec<u8> {
        records_to_csv(self.state().run.records())
    }

    /// Starts a new run over `targets`
    ///
    /// Rejected without any state change while a run is active. Invalid
    /// targets or settings are fatal for the new run: it is recorded as
    /// `Failed` and a `failed` event is published.
    pub async fn start(&self, targets: Vec<Target>, settings: CollectionSettings) -> CommandAck {
        let validation = validate_queue(&targets).and_then(|_| settings.validate());
        let total = targets.len();

        let (ack, events) = {
            let mut state = self.state();
            if state.run.status().is_active() {
                return CommandAck::rejected("A collection run is already in progress");
            }

            let mut run = CollectionRun::begin(targets, settings, self.inner.config_hash.clone());
            match validation {
                Ok(()) => {
                    state.run = run;
                    tracing::info!("Starting collection of {} targets", total);
                    (
                        CommandAck::accepted(),
                        vec![CollectionEvent::StatusChanged {
                            status: RunStatus::Running,
                        }],
                    )
                }
                Err(e) => {
                    let message = format!("Invalid collection request: {}", e);
                    tracing::error!("{}", message);
                    run.set_status(RunStatus::Failed);
                    state.run = run;
                    (
                        CommandAck::rejected(message.clone()),
                        vec![
                            CollectionEvent::StatusChanged {
                                status: RunStatus::Failed,
                            },
                            CollectionEvent::Failed {
                                error_message: message,
                            },
                        ],
                    )
                }
            }
        };

        self.checkpoint().await;
        self.publish(events);
        ack
    }

    /// Continues a stopped or interrupted run from its cursor
    pub async fn resume(&self) -> CommandAck {
        {
            let mut state = self.state();
            let run = &mut state.run;
            if run.status().is_active() {
                return CommandAck::rejected("A collection run is already in progress");
            }
            if !run.is_resumable() {
                return CommandAck::rejected("There is no stopped run to resume");
            }
            tracing::info!(
                "Resuming collection at target {}/{}",
                run.cursor() + 1,
                run.queue().len()
            );
            run.set_status(RunStatus::Running);
        }

        self.checkpoint().await;
        self.publish(vec![CollectionEvent::StatusChanged {
            status: RunStatus::Running,
        }]);
        CommandAck::accepted()
    }

    /// Requests a cooperative stop
    ///
    /// The run passes through `Stopping`; any open tab is closed right away
    /// and the run settles at `Idle` once the current item winds down.
    pub async fn stop(&self) -> CommandAck {
        let (active_tab, driving) = {
            let mut state = self.state();
            if state.run.status() != RunStatus::Running {
                return CommandAck::rejected("No collection run is in progress");
            }
            state.run.set_status(RunStatus::Stopping);
            (state.active_tab.take(), state.driving)
        };
        tracing::info!("Stop requested");

        self.publish(vec![CollectionEvent::StatusChanged {
            status: RunStatus::Stopping,
        }]);
        self.inner.stop_signal.notify_waiters();

        if let Some(tab) = active_tab {
            if let Err(e) = self.inner.browser.close_tab(tab).await {
                tracing::warn!("Failed to close {} on stop: {}", tab, e);
            }
        }

        if driving {
            self.checkpoint().await;
        } else {
            self.settle_stopped().await;
        }

        CommandAck::accepted()
    }

    /// Drives `process_next` until the run halts
    ///
    /// Only one caller drives a run at a time; a second concurrent call
    /// returns the current status immediately.
    pub async fn run_to_end(&self) -> RunStatus {
        {
            let mut state = self.state();
            if state.driving {
                tracing::debug!("Run is already being driven");
                return state.run.status();
            }
            state.driving = true;
        }
        let mut guard = DriveGuard {
            coordinator: self,
            armed: true,
        };

        loop {
            if let Step::Halted(_) = self.process_next().await {
                let mut state = self.state();
                // A resume or new start may have landed while halting
                if state.run.status() == RunStatus::Running {
                    continue;
                }
                state.driving = false;
                guard.armed = false;
                return state.run.status();
            }
        }
    }

    /// Processes the item under the cursor
    pub async fn process_next(&self) -> Step {
        let (status, cursor, total, target, settings) = {
            let state = self.state();
            let run = &state.run;
            (
                run.status(),
                run.cursor(),
                run.queue().len(),
                run.current_target().cloned(),
                *run.settings(),
            )
        };

        match status {
            RunStatus::Running => {}
            RunStatus::Stopping => return Step::Halted(self.settle_stopped().await),
            other => return Step::Halted(other),
        }

        let Some(target) = target else {
            return Step::Halted(self.complete().await);
        };

        if settings.use_simulated_data {
            return Step::Halted(self.simulate_remaining().await);
        }

        self.publish(vec![CollectionEvent::Progress {
            target_index: cursor,
            total,
            target_name: target.name.clone(),
            percent: ((cursor * 100) / total) as u8,
        }]);

        if !self.pace(cursor).await {
            return Step::Halted(self.settle_stopped().await);
        }

        tracing::info!("Processing target {}/{}: {}", cursor + 1, total, target.name);
        let outcome = self.visit(&target, &settings).await;
        self.finish_item(&target, outcome).await
    }

    /// Waits for the rate-limit delay; returns false if the run stopped meanwhile
    async fn pace(&self, cursor: usize) -> bool {
        let delay = self.inner.rate_limit.delay(cursor).sample_now();

        let stopped = self.inner.stop_signal.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        if self.status() != RunStatus::Running {
            return false;
        }

        if !delay.is_zero() {
            tracing::debug!("Waiting {:?} before the next target", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut stopped => {}
            }
        }

        self.status() == RunStatus::Running
    }

    /// Opens the target's tab, runs the extraction and closes the tab
    async fn visit(
        &self,
        target: &Target,
        settings: &CollectionSettings,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        let mut session =
            TabSession::open(self.inner.browser.clone(), &self.inner.slot, &target.url).await?;

        // A stop that landed while the tab was opening found no tab to close
        let tracked = {
            let mut state = self.state();
            let running = state.run.status() == RunStatus::Running;
            if running {
                state.active_tab = session.tab();
            }
            running
        };
        if !tracked {
            if let Err(e) = session.release().await {
                tracing::warn!("Failed to close tab for {}: {}", target.name, e);
            }
            return Err(ExtractionError::Stopped);
        }

        let result = match session.ready(&self.inner.tab_options).await {
            Ok(_) if self.status() != RunStatus::Running => Err(ExtractionError::Stopped),
            Ok(page) => {
                if !page.loaded {
                    tracing::debug!("Extracting from {} without a load signal", page.tab);
                }
                self.inner
                    .extractor
                    .extract(&page, ExtractionRequest::from(settings))
                    .await
            }
            Err(e) => Err(e.into()),
        };

        self.state().active_tab = None;
        if let Err(e) = session.release().await {
            tracing::warn!("Failed to close tab for {}: {}", target.name, e);
        }

        result
    }

    /// Applies an item's outcome to the run and checkpoints it
    async fn finish_item(
        &self,
        target: &Target,
        outcome: Result<Vec<ExtractedRecord>, ExtractionError>,
    ) -> Step {
        let mut events = Vec::new();
        let (stopped, exhausted) = {
            let mut state = self.state();
            let run = &mut state.run;
            let stopped = run.status() != RunStatus::Running;

            match outcome {
                Ok(mut records) => {
                    for record in &mut records {
                        record.target_id = target.id.clone();
                    }
                    tracing::info!("Extracted {} records from {}", records.len(), target.name);
                    run.append_records(records);
                    run.advance();
                }
                Err(e) if stopped => {
                    tracing::info!("Abandoned {} after stop: {}", target.name, e);
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Extraction failed for {}: {}", target.name, message);
                    run.record_failure(target.id.clone(), message.clone());
                    run.advance();
                    events.push(CollectionEvent::ItemFailed {
                        target_id: target.id.clone(),
                        error_message: message,
                    });
                }
            }

            (stopped, run.is_exhausted())
        };

        self.checkpoint().await;
        self.publish(events);

        if stopped {
            Step::Halted(self.settle_stopped().await)
        } else if exhausted {
            Step::Halted(self.complete().await)
        } else {
            Step::Continue
        }
    }

    /// Synthesizes records for every remaining target in one pass
    async fn simulate_remaining(&self) -> RunStatus {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            let run = &mut state.run;
            let total = run.queue().len();
            let settings = *run.settings();
            let mut rng = rand::rng();

            while let Some(target) = run.current_target().cloned() {
                events.push(CollectionEvent::Progress {
                    target_index: run.cursor(),
                    total,
                    target_name: target.name.clone(),
                    percent: run.percent(),
                });
                run.append_records(simulate_records(&target, &settings, &mut rng));
                run.advance();
            }
            tracing::info!("Simulated {} records for {} targets", run.records().len(), total);
        }

        self.publish(events);
        self.complete().await
    }

    /// Marks an exhausted run `Completed`
    async fn complete(&self) -> RunStatus {
        let event = {
            let mut state = self.state();
            let run = &mut state.run;
            if run.status() != RunStatus::Running || !run.is_exhausted() {
                return run.status();
            }
            run.set_status(RunStatus::Completed);
            tracing::info!(
                "Collection completed: {} records, {} failed targets",
                run.records().len(),
                run.failures().len()
            );
            CollectionEvent::Completed {
                records: run.records().to_vec(),
                failed_items: run.failures().len(),
            }
        };

        self.checkpoint().await;
        self.publish(vec![
            CollectionEvent::StatusChanged {
                status: RunStatus::Completed,
            },
            event,
        ]);
        RunStatus::Completed
    }

    /// Moves a `Stopping` run to `Idle`
    async fn settle_stopped(&self) -> RunStatus {
        {
            let mut state = self.state();
            if state.run.status() != RunStatus::Stopping {
                return state.run.status();
            }
            state.run.set_status(RunStatus::Idle);
            tracing::info!(
                "Collection stopped at target {}/{}",
                state.run.cursor(),
                state.run.queue().len()
            );
        }

        self.checkpoint().await;
        self.publish(vec![CollectionEvent::StatusChanged {
            status: RunStatus::Idle,
        }]);
        RunStatus::Idle
    }

    /// Writes the whole run under the run key
    ///
    /// Storage failures are logged and otherwise ignored; the in-memory run
    /// stays authoritative.
    async fn checkpoint(&self) {
        let _guard = self.inner.persist_lock.lock().await;
        let snapshot = self.snapshot();
        if let Err(e) = self.inner.store.save_run(&snapshot).await {
            tracing::warn!("Failed to checkpoint run: {}", e);
        }
    }

    fn publish(&self, events: Vec<CollectionEvent>) {
        for event in events {
            self.inner.events.publish(&event);
        }
    }
}
