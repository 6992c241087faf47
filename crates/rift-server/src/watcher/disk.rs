//! File system watcher with debouncing.
//!
//! Watches the project directory recursively and filters changes to relevant
//! files, ignoring dependency directories, hidden files and configured
//! patterns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Result, ServerError};

/// Patterns ignored in every project.
pub const DEFAULT_IGNORE: &[&str] = &["node_modules", ".git"];

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Recursive disk watcher. Dropping it stops the subscription.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    debouncer: JoinHandle<()>,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`. Must be called from within a tokio runtime.
    ///
    /// The first change to a file is reported at once. Further changes to it
    /// within `debounce` are held back and reported once when the window
    /// closes, so the last write is always delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or the platform watcher
    /// cannot be created.
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("watch root does not exist: {}", root.display()),
            )));
        }

        let (raw_tx, raw_rx) = mpsc::channel(256);
        let (tx, rx) = mpsc::channel(100);
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };

            for path in &event.paths {
                if should_ignore(path, &watch_root, &ignore_patterns) {
                    continue;
                }

                let change = match event.kind {
                    notify::EventKind::Create(_) => FileChange::Created(path.clone()),
                    notify::EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    notify::EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                let _ = raw_tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        let debouncer = tokio::spawn(run_debounce(raw_rx, tx, debounce));

        Ok((
            Self {
                _watcher: watcher,
                debouncer,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debouncer.abort();
    }
}

/// Leading and trailing edge debounce per path.
async fn run_debounce(
    mut raw: mpsc::Receiver<FileChange>,
    out: mpsc::Sender<FileChange>,
    window: Duration,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let received = match debouncer.next_deadline() {
            Some(deadline) => match tokio::time::timeout_at(deadline, raw.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    for change in debouncer.take_due(Instant::now()) {
                        if out.send(change).await.is_err() {
                            return;
                        }
                    }
                    continue;
                }
            },
            None => raw.recv().await,
        };

        let Some(change) = received else {
            break;
        };
        if let Some(change) = debouncer.accept(change, Instant::now()) {
            if out.send(change).await.is_err() {
                return;
            }
        }
    }
}

struct Debouncer {
    window: Duration,
    /// Last delivery per path.
    sent: HashMap<PathBuf, Instant>,
    /// Changes held back since the last delivery.
    pending: HashMap<PathBuf, FileChange>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            sent: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Returns the change to deliver now, if any.
    fn accept(&mut self, change: FileChange, now: Instant) -> Option<FileChange> {
        let path = change.path().to_path_buf();

        // Removals are never debounced away.
        if matches!(change, FileChange::Removed(_)) {
            self.pending.remove(&path);
            self.sent.remove(&path);
            return Some(change);
        }

        let in_window = self
            .sent
            .get(&path)
            .is_some_and(|at| now.duration_since(*at) < self.window);
        if in_window {
            self.pending.insert(path, change);
            None
        } else {
            self.sent.insert(path, now);
            Some(change)
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .keys()
            .filter_map(|path| self.sent.get(path))
            .min()
            .map(|at| *at + self.window)
    }

    /// Held-back changes whose window has closed.
    fn take_due(&mut self, now: Instant) -> Vec<FileChange> {
        let due: Vec<PathBuf> = self
            .pending
            .keys()
            .filter(|path| {
                self.sent
                    .get(*path)
                    .is_none_or(|at| now.duration_since(*at) >= self.window)
            })
            .cloned()
            .collect();

        let mut changes = Vec::with_capacity(due.len());
        for path in due {
            if let Some(change) = self.pending.remove(&path) {
                self.sent.insert(path, now);
                changes.push(change);
            }
        }

        let window = self.window;
        let pending = &self.pending;
        self.sent
            .retain(|path, at| pending.contains_key(path) || now.duration_since(*at) < window);
        changes
    }
}

/// Whether `path` is outside `root` or matches an ignore rule.
///
/// Patterns starting with `*` match a suffix; other patterns match a leading
/// directory or any path component.
pub fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };

    let path_str = rel_path.to_string_lossy();

    for pattern in DEFAULT_IGNORE
        .iter()
        .copied()
        .chain(ignore_patterns.iter().map(String::as_str))
    {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if path_str.ends_with(suffix) {
                return true;
            }
        } else if rel_path
            .components()
            .any(|component| component.as_os_str() == pattern)
            || path_str.starts_with(pattern)
        {
            return true;
        }
    }

    rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
