//! Debounced filesystem watcher for the projects directory.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use glob::{MatchOptions, Pattern};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pagesync_protocol::OperationKind;
use pagesync_store::now_millis;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kind of a debounced file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    /// The file appeared.
    Added,
    /// The file changed.
    Modified,
    /// The file is gone.
    Removed,
}

impl FileEventKind {
    /// The queue operation for this event.
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            FileEventKind::Added => OperationKind::FileAdded,
            FileEventKind::Modified => OperationKind::FileModified,
            FileEventKind::Removed => OperationKind::FileRemoved,
        }
    }
}

/// A debounced change to one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// What happened.
    pub kind: FileEventKind,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Emission time (Unix ms).
    pub timestamp: i64,
}

/// Decides which paths under the root are tracked.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    extension: String,
    ignores: Vec<Pattern>,
}

impl WatchFilter {
    /// Builds a filter. Invalid patterns are logged and skipped.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, patterns: &[String]) -> Self {
        let ignores = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self {
            root: root.into(),
            extension: extension.into(),
            ignores,
        }
    }

    /// Builds the filter described by `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.projects_dir.clone(),
            config.watch_extension.clone(),
            &config.ignore_patterns,
        )
    }

    /// Returns true for files under the root with the tracked extension
    /// that match no ignore pattern.
    pub fn accepts(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()));
        if !has_extension {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        !self.is_ignored(relative)
    }

    /// Patterns are tried against the relative path and every trailing
    /// sub-path, so `.git/**` also catches `project/.git/HEAD.md`.
    fn is_ignored(&self, relative: &Path) -> bool {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        (0..parts.len()).any(|start| {
            let candidate = parts[start..].join("/");
            self.ignores
                .iter()
                .any(|pattern| pattern.matches_with(&candidate, options))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    tokio::fs::metadata(path).await.ok().map(|meta| Fingerprint {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

#[derive(Debug)]
struct Pending {
    created: bool,
    deadline: Instant,
    seen: Option<Fingerprint>,
}

/// Per-path debounce with a write-stability check.
///
/// A path is emitted once no event arrived for a full window and its size
/// and mtime did not move since the last event.
#[derive(Debug)]
pub(crate) struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub(crate) async fn record(&mut self, path: PathBuf, created: bool, now: Instant) {
        let seen = fingerprint(&path).await;
        let deadline = now + self.window;
        self.pending
            .entry(path)
            .and_modify(|p| {
                p.created |= created;
                p.deadline = deadline;
                p.seen = seen;
            })
            .or_insert(Pending {
                created,
                deadline,
                seen,
            });
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) async fn flush_due(&mut self, now: Instant) -> Vec<FileEvent> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events = Vec::new();
        for path in due {
            let current = fingerprint(&path).await;
            let Some(entry) = self.pending.get_mut(&path) else {
                continue;
            };
            let kind = match current {
                None => FileEventKind::Removed,
                Some(fp) if entry.seen != Some(fp) => {
                    // Still being written.
                    entry.seen = Some(fp);
                    entry.deadline = now + self.window;
                    continue;
                }
                Some(_) if entry.created => FileEventKind::Added,
                Some(_) => FileEventKind::Modified,
            };
            self.pending.remove(&path);
            events.push(FileEvent {
                kind,
                path,
                timestamp: now_millis(),
            });
        }
        events
    }
}

/// Running watcher. Events are delivered on the channel given to
/// [`FileWatcher::start`].
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Starts watching `config.projects_dir` recursively.
    pub fn start(config: &SyncConfig, events: mpsc::Sender<FileEvent>) -> SyncResult<Self> {
        let filter = WatchFilter::from_config(config);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<(PathBuf, bool)>();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let created = match event.kind {
                        EventKind::Create(_) => true,
                        EventKind::Modify(_) | EventKind::Remove(_) => false,
                        _ => return,
                    };
                    for path in event.paths {
                        if filter.accepts(&path) {
                            // Receiver gone means the watcher is stopping.
                            let _ = raw_tx.send((path, created));
                        }
                    }
                }
                Err(e) => error!(error = %e, "watch error"),
            }
        })?;
        watcher.watch(&config.projects_dir, RecursiveMode::Recursive)?;
        info!(root = %config.projects_dir.display(), "file watcher started");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(
            raw_rx,
            Debouncer::new(config.debounce),
            events,
            cancel.clone(),
        ));

        Ok(Self {
            watcher: Some(watcher),
            cancel,
            task: Some(task),
        })
    }

    /// Returns true while the debounce task runs.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops watching and discards pending debounce timers.
    pub async fn stop(mut self) {
        self.watcher.take();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "watcher task failed");
            }
        }
        info!("file watcher stopped");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn debounce_loop(
    mut raw: mpsc::UnboundedReceiver<(PathBuf, bool)>,
    mut debouncer: Debouncer,
    out: mpsc::Sender<FileEvent>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = raw.recv() => match received {
                Some((path, created)) => debouncer.record(path, created, Instant::now()).await,
                None => break,
            },
            _ = sleep_until_some(deadline) => {
                for event in debouncer.flush_due(Instant::now()).await {
                    debug!(path = %event.path.display(), kind = ?event.kind, "file event");
                    if out.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    if debouncer.len() > 0 {
        debug!(dropped = debouncer.len(), "discarding pending file events");
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
