//! The sync engine: lifecycle, queue draining and the public API.

mod paths;
mod pull;
mod push;

pub use paths::contained_path;

use crate::client::{CircuitState, ResilientClient};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::poller::{PageChange, PollReport, Poller};
use crate::queue::SyncQueue;
use crate::remote::{RemoteUser, RemoteWorkspace};
use crate::status::{DrainReport, EngineStatus, GcReport, HealthReport};
use crate::watcher::{FileEvent, FileWatcher};
use chrono::{DateTime, Utc};
use pagesync_protocol::{OperationKind, Side, SyncOperation};
use pagesync_store::{
    now_millis, ConflictRecord, Direction, Entity, EntityType, LogEntry, LogOperation, LogQuery,
    NewEntity, Store, WalEntry,
};
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the watcher-to-queue channel.
const FILE_EVENT_BUFFER: usize = 256;

/// How to look up an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    /// By local path.
    Path(String),
    /// By remote page id.
    RemoteId(String),
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<FileWatcher>,
}

struct ActiveFlag<'a>(&'a AtomicBool);

impl<'a> ActiveFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Keeps local files and remote pages in sync.
///
/// Local changes arrive from the file watcher (or
/// [`notify_file_change`](Self::notify_file_change)), remote changes from
/// the poller. Both feed one deduplicating queue that a single drain
/// task processes. Every content write is bracketed by a WAL row in the
/// store.
pub struct SyncEngine<R: RemoteWorkspace> {
    config: SyncConfig,
    store: Arc<Store>,
    client: Arc<ResilientClient<R>>,
    queue: SyncQueue,
    poller: Poller,
    drain_lock: AsyncMutex<()>,
    draining: AtomicBool,
    running: Mutex<Option<Running>>,
    created: Instant,
}

impl<R: RemoteWorkspace> SyncEngine<R> {
    /// Creates an engine over `remote` with a fresh resilient client.
    pub fn new(config: SyncConfig, store: Arc<Store>, remote: Arc<R>) -> Self {
        let client = Arc::new(ResilientClient::new(remote, config.client.clone()));
        Self::with_client(config, store, client)
    }

    /// Creates an engine sharing an existing client.
    pub fn with_client(
        config: SyncConfig,
        store: Arc<Store>,
        client: Arc<ResilientClient<R>>,
    ) -> Self {
        Self {
            queue: SyncQueue::new(config.max_queue_size),
            poller: Poller::new(),
            drain_lock: AsyncMutex::new(()),
            draining: AtomicBool::new(false),
            running: Mutex::new(None),
            created: Instant::now(),
            config,
            store,
            client,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Remote client.
    pub fn client(&self) -> &Arc<ResilientClient<R>> {
        &self.client
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Reports incomplete WAL rows, then starts the watcher, the drain
    /// loop and the poll loop.
    pub fn start(self: &Arc<Self>) -> SyncResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }
        self.recover()?;

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        let watcher = if self.config.watch {
            let (tx, rx) = mpsc::channel(FILE_EVENT_BUFFER);
            let watcher = FileWatcher::start(&self.config, tx)?;
            tasks.push(tokio::spawn(
                Arc::clone(self).forward_file_events(rx, cancel.clone()),
            ));
            Some(watcher)
        } else {
            None
        };
        tasks.push(tokio::spawn(Arc::clone(self).drain_loop(cancel.clone())));
        tasks.push(tokio::spawn(Arc::clone(self).poll_loop(cancel.clone())));

        *running = Some(Running {
            cancel,
            tasks,
            watcher,
        });
        info!(
            projects_dir = %self.config.projects_dir.display(),
            watch = self.config.watch,
            "sync engine started"
        );
        Ok(())
    }

    /// Returns true between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stops the background tasks and runs one final drain.
    pub async fn stop(&self) -> SyncResult<DrainReport> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(DrainReport::default());
        };
        running.cancel.cancel();
        if let Some(watcher) = running.watcher {
            watcher.stop().await;
        }
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        let report = self.drain().await?;
        info!(processed = report.processed, "sync engine stopped");
        Ok(report)
    }

    async fn forward_file_events(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FileEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.enqueue(SyncOperation::new(
                            event.kind.operation_kind(),
                            path_key(&event.path),
                            event.timestamp,
                        ));
                    }
                    None => break,
                },
            }
        }
    }

    async fn drain_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.drain().await {
                        error!(error = %e, "drain failed");
                    }
                }
            }
        }
    }

    async fn poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "poll failed");
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Adds an operation to the queue. Returns false if it was dropped.
    pub fn enqueue(&self, op: SyncOperation) -> bool {
        self.queue.enqueue(op)
    }

    /// Queues a local change for `path`, as the watcher would.
    pub fn notify_file_change(&self, path: &Path) -> bool {
        let kind = if path.exists() {
            OperationKind::FileModified
        } else {
            OperationKind::FileRemoved
        };
        self.enqueue(SyncOperation::new(kind, path_key(path), now_millis()))
    }

    /// Processes everything currently queued.
    ///
    /// Only one drain runs at a time. Failures are written to the sync log
    /// and counted; operations rejected by an open circuit go back on the
    /// queue unless a newer operation for the same key arrived meanwhile.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let _serial = self.drain_lock.lock().await;
        let ops = self.queue.drain();
        let mut report = DrainReport::default();
        if ops.is_empty() {
            return Ok(report);
        }
        let _active = ActiveFlag::raise(&self.draining);
        for op in ops {
            match self.run_operation(&op).await {
                Ok(()) => report.processed += 1,
                Err(SyncError::CircuitOpen { .. }) => {
                    self.queue.requeue(op);
                    report.deferred += 1;
                }
                Err(_) => report.failed += 1,
            }
        }
        debug!(
            processed = report.processed,
            failed = report.failed,
            deferred = report.deferred,
            "drain complete"
        );
        Ok(report)
    }

    /// Forces a sync. `None` drains the queue. A document path is pushed
    /// if its content changed; a project path does that for every document
    /// below it.
    pub async fn trigger_sync(&self, path: Option<&Path>) -> SyncResult<DrainReport> {
        let Some(path) = path else {
            return self.drain().await;
        };
        let key = path_key(path);
        let entity = self
            .store
            .entity_by_path(&key)?
            .ok_or_else(|| SyncError::UnknownEntity(key.clone()))?;

        let _serial = self.drain_lock.lock().await;
        let _active = ActiveFlag::raise(&self.draining);
        if entity.entity_type != EntityType::Project {
            let op = SyncOperation::new(OperationKind::FileModified, key, now_millis());
            self.run_operation(&op).await?;
            return Ok(DrainReport {
                processed: 1,
                ..DrainReport::default()
            });
        }

        let mut report = DrainReport::default();
        for doc in self.documents_below(&entity)? {
            let op = SyncOperation::new(OperationKind::FileModified, doc.local_path, now_millis());
            let mut one = DrainReport::default();
            match self.run_operation(&op).await {
                Ok(()) => one.processed = 1,
                Err(SyncError::CircuitOpen { .. }) => one.deferred = 1,
                Err(_) => one.failed = 1,
            }
            report.absorb(one);
        }
        Ok(report)
    }

    fn documents_below(&self, project: &Entity) -> SyncResult<Vec<Entity>> {
        let mut out = Vec::new();
        let mut frontier = vec![project.id];
        while let Some(parent) = frontier.pop() {
            for child in self.store.children(parent, None)? {
                frontier.push(child.id);
                if !child.entity_type.is_container() {
                    out.push(child);
                }
            }
        }
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    async fn run_operation(&self, op: &SyncOperation) -> SyncResult<()> {
        let result = match op.side {
            Side::Local => self.process_local(op).await,
            Side::Remote => self.process_remote(op).await,
        };
        if let Err(e) = &result {
            self.log_failure(op, e);
        }
        result
    }

    fn log_failure(&self, op: &SyncOperation, err: &SyncError) {
        if let SyncError::CircuitOpen { retry_in } = err {
            debug!(key = %op.entity_key, retry_in_secs = retry_in.as_secs(), "deferred, circuit open");
            return;
        }
        warn!(key = %op.entity_key, kind = %op.kind, error = %err, "sync operation failed");

        let entity_id = match op.side {
            Side::Local => self.store.entity_by_path(&op.entity_key),
            Side::Remote => self.store.entity_by_remote_id(&op.entity_key),
        }
        .ok()
        .flatten()
        .map(|e| e.id);
        let direction = match op.side {
            Side::Local => Direction::LocalToRemote,
            Side::Remote => Direction::RemoteToLocal,
        };
        let mut detail = json!({
            "operation": op.kind.as_str(),
            "entity_key": op.entity_key,
            "message": err.to_string(),
        });
        if let SyncError::Api(api) = err {
            detail["status"] = json!(api.status);
            detail["remediation"] = json!(api.remediation);
        }
        if let Err(e) = self
            .store
            .append_log(entity_id, LogOperation::Error, Some(direction), &detail)
        {
            error!(error = %e, "failed to record sync error");
        }
    }

    // ------------------------------------------------------------------
    // Remote polling
    // ------------------------------------------------------------------

    /// Runs one poll cycle. `None` when a cycle was already running.
    pub async fn poll_once(&self) -> SyncResult<Option<PollReport>> {
        self.poller
            .poll_entities(&self.store, &self.client, &self.queue)
            .await
    }

    /// Lists database rows edited after `since`.
    pub async fn poll_database(
        &self,
        database_id: &str,
        since: DateTime<Utc>,
    ) -> SyncResult<Vec<PageChange>> {
        self.poller
            .poll_database(&self.client, database_id, since)
            .await
    }

    /// Checks the configured token.
    pub async fn validate_token(&self) -> SyncResult<RemoteUser> {
        self.client.validate_token().await
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Registers (or revives) a tracked pair.
    pub fn register_entity(&self, entity: &NewEntity) -> SyncResult<Entity> {
        Ok(self.store.upsert_entity(entity)?)
    }

    /// Looks up a live entity.
    pub fn find_entity(&self, key: &EntityKey) -> SyncResult<Option<Entity>> {
        Ok(match key {
            EntityKey::Path(path) => self.store.entity_by_path(path)?,
            EntityKey::RemoteId(id) => self.store.entity_by_remote_id(id)?,
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Queue and task snapshot.
    pub fn status(&self) -> EngineStatus {
        let watcher_active = self
            .running
            .lock()
            .as_ref()
            .and_then(|r| r.watcher.as_ref())
            .is_some_and(FileWatcher::is_active);
        EngineStatus {
            pending: self.queue.len(),
            active: self.draining.load(Ordering::Acquire),
            dropped: self.queue.dropped(),
            watcher_active,
            polling: self.poller.is_polling(),
        }
    }

    /// Breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.client.circuit_state()
    }

    /// Consecutive counted remote failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.client.consecutive_failures()
    }

    /// Number of unresolved WAL rows.
    pub fn pending_wal_count(&self) -> SyncResult<usize> {
        Ok(self.store.wal_pending_count()?)
    }

    /// Health snapshot.
    pub fn health(&self) -> SyncResult<HealthReport> {
        Ok(HealthReport {
            uptime_secs: self.created.elapsed().as_secs(),
            store_ok: self.store.quick_check()?,
            circuit_state: self.client.circuit_state(),
            consecutive_failures: self.client.consecutive_failures(),
            last_success: self.client.last_success(),
            incomplete_wal: self.store.wal_incomplete()?,
            queue: self.status(),
        })
    }

    /// Returns WAL rows left by an interrupted run and logs each one.
    ///
    /// Rows are reported, never replayed; the next successful sync of the
    /// entity retires them.
    pub fn recover(&self) -> SyncResult<Vec<WalEntry>> {
        let incomplete = self.store.wal_incomplete()?;
        for entry in &incomplete {
            warn!(
                wal_id = entry.id,
                entity_id = entry.entity_id,
                operation = %entry.operation,
                state = %entry.state,
                "incomplete WAL entry from a previous run"
            );
        }
        Ok(incomplete)
    }

    /// Reads the sync log.
    pub fn sync_log(&self, query: &LogQuery) -> SyncResult<Vec<LogEntry>> {
        Ok(self.store.query_log(query)?)
    }

    /// Entities carrying a conflict marker, with both stored variants.
    pub fn conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        Ok(self.store.list_conflicts()?)
    }

    /// Removes expired soft-deleted entities and orphaned content.
    ///
    /// Waits for any running drain, so a blob stored by a sync but not yet
    /// referenced by its entity is never collected.
    pub async fn gc(&self) -> SyncResult<GcReport> {
        let _serial = self.drain_lock.lock().await;
        let entities = self.store.gc_deleted(self.config.deleted_retention)?;
        let blobs = self.store.gc_orphaned_content()?;
        if entities + blobs > 0 {
            info!(entities, blobs, "garbage collected");
        }
        Ok(GcReport { entities, blobs })
    }

    /// Marks older unfinished WAL rows of an entity as superseded.
    fn retire_stale_wal(&self, entity_id: i64) -> SyncResult<()> {
        for entry in self
            .store
            .wal_incomplete()?
            .into_iter()
            .filter(|e| e.entity_id == entity_id)
        {
            self.store.wal_mark_rolled_back(entry.id)?;
            self.store.wal_delete(entry.id)?;
        }
        Ok(())
    }
}
