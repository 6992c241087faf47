//! Change watcher: unifies disk and editor-buffer changes.
//!
//! Every change under the project root is evaluated by the validity gate.
//! Approved changes are announced as `change(path)` on a broadcast channel
//! that the hot-update stage subscribes to. Suppressed changes announce
//! nothing, but buffer text is always written to the content store first so
//! later reads see the latest edit.

pub mod disk;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use disk::{FileChange, FileWatcher, should_ignore};

use crate::content::ContentStore;
use crate::error::Result;
use crate::gate::{GateDecision, ValidityGate};

/// Default coalescing window for disk events.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Disk,
    Buffer,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub text: String,
    pub origin: ChangeOrigin,
}

impl ChangeEvent {
    pub fn disk(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            origin: ChangeOrigin::Disk,
        }
    }

    pub fn buffer(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            origin: ChangeOrigin::Buffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Evaluating,
    Propagate,
    Suppress,
}

struct DiskSubscription {
    _watcher: FileWatcher,
    task: JoinHandle<()>,
}

pub struct ChangeWatcher {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    store: Arc<ContentStore>,
    gate: ValidityGate,
    changes: broadcast::Sender<PathBuf>,
    state: Mutex<WatcherState>,
    /// Last buffer event per path, for coalescing disk events.
    buffer_events: Mutex<HashMap<PathBuf, Instant>>,
    window: Duration,
    disk: Mutex<Option<DiskSubscription>>,
}

impl ChangeWatcher {
    pub fn new(root: PathBuf, store: Arc<ContentStore>, gate: ValidityGate) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            root,
            ignore_patterns: Vec::new(),
            store,
            gate,
            changes,
            state: Mutex::new(WatcherState::Idle),
            buffer_events: Mutex::new(HashMap::new()),
            window: DEFAULT_WINDOW,
            disk: Mutex::new(None),
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receive every `change(path)` announced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.changes.subscribe()
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        !should_ignore(path, &self.root, &self.ignore_patterns)
    }

    /// Evaluate one change.
    ///
    /// Returns `None` when the event was ignored: outside the root, matching
    /// an ignore rule, or a disk event coalesced into a recent buffer event.
    pub fn handle(&self, event: ChangeEvent) -> Option<GateDecision> {
        if !self.is_watched(&event.path) {
            tracing::trace!(target: "rift::watcher", path = %event.path.display(), "ignored");
            return None;
        }

        match event.origin {
            ChangeOrigin::Buffer => {
                self.buffer_events
                    .lock()
                    .insert(event.path.clone(), Instant::now());
            }
            ChangeOrigin::Disk => {
                if self.recent_buffer_event(&event.path) {
                    tracing::debug!(
                        target: "rift::watcher",
                        path = %event.path.display(),
                        "disk event superseded by buffer edit"
                    );
                    return None;
                }
            }
        }

        self.transition(WatcherState::Evaluating, &event.path);
        if event.origin == ChangeOrigin::Buffer {
            self.store.set(event.path.clone(), &event.text);
        }

        let decision = self.gate.evaluate(&event.path, &event.text);
        match decision {
            GateDecision::Propagate => {
                self.transition(WatcherState::Propagate, &event.path);
                self.emit(&event.path);
            }
            GateDecision::Suppress => {
                self.transition(WatcherState::Suppress, &event.path);
                tracing::debug!(
                    target: "rift::watcher",
                    path = %event.path.display(),
                    "change suppressed, content not valid yet"
                );
            }
        }
        self.transition(WatcherState::Idle, &event.path);

        Some(decision)
    }

    /// A file was deleted: drop its store entry and announce the change.
    pub fn handle_removed(&self, path: &Path) {
        if !self.is_watched(path) {
            return;
        }
        self.store.invalidate(path);
        self.buffer_events.lock().remove(path);
        self.emit(path);
    }

    /// Announce `change(path)` to subscribers.
    pub fn emit(&self, path: &Path) {
        tracing::debug!(target: "rift::watcher", path = %path.display(), "change");
        // No subscribers is fine: nothing is listening for updates yet.
        let _ = self.changes.send(path.to_path_buf());
    }

    fn recent_buffer_event(&self, path: &Path) -> bool {
        self.buffer_events
            .lock()
            .get(path)
            .is_some_and(|at| at.elapsed() < self.window)
    }

    fn transition(&self, next: WatcherState, path: &Path) {
        let mut state = self.state.lock();
        tracing::trace!(
            target: "rift::watcher",
            path = %path.display(),
            from = ?*state,
            to = ?next,
            "state transition"
        );
        *state = next;
    }

    /// Start feeding disk events into [`ChangeWatcher::handle`].
    ///
    /// Calling this while already watching is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be started.
    pub fn watch_disk(self: &Arc<Self>) -> Result<()> {
        let mut disk = self.disk.lock();
        if disk.is_some() {
            return Ok(());
        }

        let (watcher, mut rx) =
            FileWatcher::new(self.root.clone(), self.ignore_patterns.clone(), self.window)?;
        let weak: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                match change {
                    FileChange::Removed(path) => this.handle_removed(&path),
                    FileChange::Created(path) | FileChange::Modified(path) => {
                        match tokio::fs::read_to_string(&path).await {
                            Ok(text) => {
                                this.handle(ChangeEvent::disk(path, text));
                            }
                            Err(e) => tracing::trace!(
                                target: "rift::watcher",
                                path = %path.display(),
                                error = %e,
                                "skipping unreadable change"
                            ),
                        }
                    }
                }
            }
        });

        tracing::info!(target: "rift::watcher", root = %self.root.display(), "watching for changes");
        *disk = Some(DiskSubscription {
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    /// Stop watching the disk. Safe to call more than once.
    pub fn unwatch(&self) {
        if let Some(subscription) = self.disk.lock().take() {
            subscription.task.abort();
            tracing::debug!(target: "rift::watcher", "disk watcher released");
        }
    }

    pub fn is_watching_disk(&self) -> bool {
        self.disk.lock().is_some()
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.unwatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn watcher(root: &Path) -> ChangeWatcher {
        ChangeWatcher::new(
            root.to_path_buf(),
            Arc::new(ContentStore::new()),
            ValidityGate::new(),
        )
    }

    #[tokio::test]
    async fn buffer_edit_updates_store_even_when_suppressed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("App.vue");
        let watcher = watcher(dir.path());
        let mut rx = watcher.subscribe();

        let broken = "<template><div>";
        let decision = watcher.handle(ChangeEvent::buffer(&path, broken));
        assert_eq!(decision, Some(GateDecision::Suppress));
        assert_eq!(watcher.store.get(&path).as_deref(), Some(broken));
        assert!(rx.try_recv().is_err());

        let fixed = "<template><div></div></template>";
        let decision = watcher.handle(ChangeEvent::buffer(&path, fixed));
        assert_eq!(decision, Some(GateDecision::Propagate));
        assert_eq!(watcher.store.get(&path).as_deref(), Some(fixed));
        assert_eq!(rx.try_recv().unwrap(), path);
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[tokio::test]
    async fn disk_event_within_window_of_buffer_event_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.js");
        let watcher = watcher(dir.path()).with_window(Duration::from_secs(60));

        assert!(watcher.handle(ChangeEvent::buffer(&path, "a")).is_some());
        assert!(watcher.handle(ChangeEvent::disk(&path, "old")).is_none());
        assert_eq!(watcher.store.get(&path).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn disk_event_does_not_write_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.js");
        let watcher = watcher(dir.path());
        let mut rx = watcher.subscribe();

        assert_eq!(
            watcher.handle(ChangeEvent::disk(&path, "x")),
            Some(GateDecision::Propagate)
        );
        assert!(!watcher.store.contains(&path));
        assert_eq!(rx.try_recv().unwrap(), path);
    }

    #[tokio::test]
    async fn ignored_paths_are_not_evaluated() {
        let dir = TempDir::new().unwrap();
        let watcher = watcher(dir.path());

        let dep = dir.path().join("node_modules/vue/index.js");
        assert!(watcher.handle(ChangeEvent::buffer(&dep, "x")).is_none());
        assert!(!watcher.store.contains(&dep));
    }

    #[tokio::test]
    async fn removal_invalidates_and_emits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("App.vue");
        let watcher = watcher(dir.path());
        let mut rx = watcher.subscribe();

        watcher.store.set(path.clone(), "text");
        watcher.handle_removed(&path);
        assert!(!watcher.store.contains(&path));
        assert_eq!(rx.try_recv().unwrap(), path);
    }

    #[tokio::test]
    async fn unwatch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let watcher = Arc::new(watcher(dir.path()));
        watcher.watch_disk().unwrap();
        assert!(watcher.is_watching_disk());

        watcher.unwatch();
        watcher.unwatch();
        assert!(!watcher.is_watching_disk());
    }
}
