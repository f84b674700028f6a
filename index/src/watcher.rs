//! Filesystem watcher that keeps the index in step with edits made outside
//! the application.
//!
//! Raw notify events are mapped to index or remove operations per document
//! and debounced per vault-relative path: every event cancels the pending
//! timer for its path and starts a new one, so a burst of saves results in a
//! single operation carrying the newest intent.

use crate::error::Result;
use crate::error::VaultError;
use crate::indexer::Indexer;
use crate::layout::VaultLayout;
use async_trait::async_trait;
use notify::Config as NotifyConfig;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use notify::event::ModifyKind;
use notify::event::RenameMode;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;
use walkdir::WalkDir;

/// Receives the debounced operations.
#[async_trait]
pub trait DocumentSink: Send + Sync + 'static {
    async fn index(&self, path: &Path) -> Result<()>;
    async fn remove(&self, path: &Path) -> Result<()>;
}

#[async_trait]
impl DocumentSink for Indexer {
    async fn index(&self, path: &Path) -> Result<()> {
        match self.index_document(path).await {
            Ok(_) => Ok(()),
            // Deleted between the existence check and the read.
            Err(VaultError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                self.remove_document_completely(path).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        self.remove_document_completely(path).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Index,
    Remove,
}

/// What a single notify event asks for, before layout filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EventAction {
    Schedule(PathBuf, WatchOp),
    Directory(PathBuf),
}

fn event_actions(event: &Event) -> Vec<EventAction> {
    let created = |path: &PathBuf| {
        if path.is_dir() {
            EventAction::Directory(path.clone())
        } else {
            EventAction::Schedule(path.clone(), WatchOp::Index)
        }
    };
    let removed = |path: &PathBuf| EventAction::Schedule(path.clone(), WatchOp::Remove);

    match &event.kind {
        EventKind::Create(_) => event.paths.iter().map(created).collect(),
        EventKind::Remove(_) => event.paths.iter().map(removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut actions = Vec::new();
            if let Some(from) = event.paths.first() {
                actions.push(removed(from));
            }
            if let Some(to) = event.paths.get(1) {
                actions.push(created(to));
            }
            actions
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                if path.exists() {
                    created(path)
                } else {
                    removed(path)
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|path| EventAction::Schedule(path.clone(), WatchOp::Index))
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug)]
struct Fired {
    rel: String,
    generation: u64,
}

struct Pending {
    generation: u64,
    op: WatchOp,
    timer: JoinHandle<()>,
}

/// Per-path cancel-and-replace timers. A timer reports back on a channel;
/// the generation check discards a report from a timer that was replaced
/// after it had already fired.
struct Debouncer {
    window: Duration,
    pending: HashMap<String, Pending>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<Fired>,
}

impl Debouncer {
    fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<Fired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            window,
            pending: HashMap::new(),
            next_generation: 0,
            fired_tx,
        };
        (debouncer, fired_rx)
    }

    fn schedule(&mut self, rel: String, op: WatchOp) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let window = self.window;
        let tx = self.fired_tx.clone();
        let key = rel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Fired {
                rel: key,
                generation,
            });
        });
        if let Some(previous) = self.pending.insert(
            rel,
            Pending {
                generation,
                op,
                timer,
            },
        ) {
            previous.timer.abort();
        }
    }

    fn take(&mut self, fired: &Fired) -> Option<WatchOp> {
        match self.pending.get(&fired.rel) {
            Some(pending) if pending.generation == fired.generation => {
                self.pending.remove(&fired.rel).map(|pending| pending.op)
            }
            _ => None,
        }
    }

    fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Watches the vault and feeds debounced operations to a [`DocumentSink`].
pub struct VaultWatcher {
    layout: VaultLayout,
    sink: Arc<dyn DocumentSink>,
    debounce: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
    errors_tx: mpsc::UnboundedSender<VaultError>,
    errors_rx: Option<mpsc::UnboundedReceiver<VaultError>>,
    started: bool,
}

impl VaultWatcher {
    pub fn new(layout: VaultLayout, sink: Arc<dyn DocumentSink>, debounce: Duration) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            layout,
            sink,
            debounce,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            errors_tx,
            errors_rx: Some(errors_rx),
            started: false,
        }
    }

    /// Failures of watching and of fired operations. Available once.
    pub fn errors(&mut self) -> Option<mpsc::UnboundedReceiver<VaultError>> {
        self.errors_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.cancel.is_cancelled()
    }

    /// Starts watching. Cancelling `cancel` (or calling [`VaultWatcher::stop`])
    /// ends the watch.
    pub fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        if self.started {
            return Err(VaultError::Config("watcher already started".to_string()));
        }
        let root = self.layout.root().to_path_buf();
        if !root.is_dir() {
            return Err(VaultError::InvalidPath(format!(
                "vault root {} is not a directory",
                root.display()
            )));
        }

        self.cancel = cancel.child_token();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            NotifyConfig::default(),
        )?;
        let (debouncer, fired_rx) = Debouncer::new(self.debounce);

        let mut event_loop = EventLoop {
            layout: self.layout.clone(),
            sink: Arc::clone(&self.sink),
            watcher,
            debouncer,
            tracker: self.tracker.clone(),
            errors: self.errors_tx.clone(),
        };
        event_loop.watch_dir(&root);
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if path.is_dir() && event_loop.in_project_tree(&path) {
                event_loop.add_directory(&path, false);
            }
        }

        let cancel = self.cancel.clone();
        self.tracker
            .spawn(event_loop.run(cancel, event_rx, fired_rx));
        self.started = true;
        info!(root = %root.display(), debounce_ms = self.debounce.as_millis(), "watching vault");
        Ok(())
    }

    /// Cancels pending timers, stops watching and waits for operations that
    /// already started.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        if self.started {
            info!(root = %self.layout.root().display(), "stopped watching vault");
        }
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct EventLoop {
    layout: VaultLayout,
    sink: Arc<dyn DocumentSink>,
    watcher: RecommendedWatcher,
    debouncer: Debouncer,
    tracker: TaskTracker,
    errors: mpsc::UnboundedSender<VaultError>,
}

impl EventLoop {
    async fn run(
        mut self,
        cancel: CancellationToken,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut fired: mpsc::UnboundedReceiver<Fired>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => self.handle_event(event),
                Some(fired) = fired.recv() => self.fire(fired),
            }
        }
        debug!(pending = self.debouncer.len(), "watch loop exiting");
        self.debouncer.cancel_all();
    }

    fn handle_event(&mut self, event: notify::Result<Event>) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                self.report(VaultError::Watch(err));
                return;
            }
        };
        for action in event_actions(&event) {
            match action {
                EventAction::Schedule(path, op) => self.schedule(&path, op),
                EventAction::Directory(path) => {
                    if self.in_project_tree(&path) {
                        self.add_directory(&path, true);
                    }
                }
            }
        }
    }

    fn schedule(&mut self, path: &Path, op: WatchOp) {
        let Ok(rel) = self.layout.relative(path) else {
            return;
        };
        if self.layout.classify_rel(&rel).is_document() {
            debug!(path = %rel, ?op, "scheduling");
            self.debouncer.schedule(rel, op);
        }
    }

    fn fire(&mut self, fired: Fired) {
        let Some(op) = self.debouncer.take(&fired) else {
            return;
        };
        let path = self.layout.absolute(&fired.rel);
        let op = if op == WatchOp::Index && !path.exists() {
            WatchOp::Remove
        } else {
            op
        };

        let sink = Arc::clone(&self.sink);
        let errors = self.errors.clone();
        self.tracker.spawn(async move {
            debug!(path = %fired.rel, ?op, "applying");
            let result = match op {
                WatchOp::Index => sink.index(&path).await,
                WatchOp::Remove => sink.remove(&path).await,
            };
            if let Err(err) = result {
                warn!(path = %fired.rel, "watch operation failed: {err}");
                let _ = errors.send(err);
            }
        });
    }

    /// Watches `dir` and every directory below it. With `schedule_documents`
    /// the documents already inside are indexed too, since they produced no
    /// events of their own.
    fn add_directory(&mut self, dir: &Path, schedule_documents: bool) {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.report(err.into());
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                self.watch_dir(entry.path());
            } else if schedule_documents && entry.file_type().is_file() {
                self.schedule(entry.path(), WatchOp::Index);
            }
        }
    }

    fn watch_dir(&mut self, dir: &Path) {
        if let Err(err) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            self.report(err.into());
        }
    }

    fn in_project_tree(&self, path: &Path) -> bool {
        self.layout
            .relative(path)
            .is_ok_and(|rel| self.layout.in_project_tree(&rel))
    }

    fn report(&self, err: VaultError) {
        warn!("vault watcher error: {err}");
        let _ = self.errors.send(err);
    }
}
