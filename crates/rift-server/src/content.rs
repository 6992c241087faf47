//! Content store: the single "read current content of a file" primitive.
//!
//! Reads consult an ordered list of interceptors; the first that has an
//! answer wins. The buffer overlay (unsaved editor text) is always first and
//! the disk reader always last, so an overlay entry fully shadows the file
//! on disk until it is invalidated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::ContentReadError;

/// One layer of the read chain.
///
/// Returning `None` delegates to the next layer.
#[async_trait]
pub trait ReadInterceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn read(&self, path: &Path) -> Option<Result<String, ContentReadError>>;
}

/// In-memory overlay of editor buffer text, keyed by absolute path.
#[derive(Debug, Default)]
pub struct BufferOverlay {
    entries: DashMap<PathBuf, Arc<str>>,
}

impl BufferOverlay {
    pub fn set(&self, path: PathBuf, text: &str) {
        self.entries.insert(path, Arc::from(text));
    }

    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.entries.get(path).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ReadInterceptor for BufferOverlay {
    fn name(&self) -> &str {
        "buffer-overlay"
    }

    async fn read(&self, path: &Path) -> Option<Result<String, ContentReadError>> {
        self.get(path).map(|text| Ok(text.to_string()))
    }
}

/// Terminal disk reader with an mtime-keyed cache.
#[derive(Debug, Default)]
pub struct DiskReader {
    cache: DashMap<PathBuf, (SystemTime, Arc<str>)>,
}

impl DiskReader {
    pub async fn read(&self, path: &Path) -> Result<String, ContentReadError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(ContentReadError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.cache.remove(path);
                return Err(ContentReadError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ContentReadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let modified = metadata.modified().ok();
        if let (Some(modified), Some(entry)) = (modified, self.cache.get(path)) {
            let (cached_at, text) = entry.value();
            if *cached_at == modified {
                return Ok(text.to_string());
            }
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => ContentReadError::NotFound(path.to_path_buf()),
                _ => ContentReadError::Io {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        if let Some(modified) = modified {
            self.cache
                .insert(path.to_path_buf(), (modified, Arc::from(text.as_str())));
        }
        Ok(text)
    }

    pub fn forget(&self, path: &Path) {
        self.cache.remove(path);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

pub struct ContentStore {
    overlay: Arc<BufferOverlay>,
    /// Layers between the overlay and the disk, in consultation order.
    interceptors: RwLock<Vec<Arc<dyn ReadInterceptor>>>,
    disk: DiskReader,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            overlay: Arc::new(BufferOverlay::default()),
            interceptors: RwLock::new(Vec::new()),
            disk: DiskReader::default(),
        }
    }

    /// Add a layer after every existing layer and before the disk reader.
    pub fn with_interceptor(self, interceptor: impl ReadInterceptor + 'static) -> Self {
        self.add_interceptor(Arc::new(interceptor));
        self
    }

    /// Same as [`ContentStore::with_interceptor`] for a store that is
    /// already shared.
    pub fn add_interceptor(&self, interceptor: Arc<dyn ReadInterceptor>) {
        tracing::debug!(interceptor = interceptor.name(), "installing read interceptor");
        self.interceptors.write().push(interceptor);
    }

    /// Read the current content of `path`.
    ///
    /// # Errors
    ///
    /// `ContentReadError::NotFound` if no layer knows the path and it does not
    /// exist on disk.
    pub async fn read(&self, path: &Path) -> Result<String, ContentReadError> {
        if let Some(result) = self.overlay.read(path).await {
            tracing::trace!(path = %path.display(), "read from buffer overlay");
            return result;
        }

        let interceptors = self.interceptors.read().clone();
        for interceptor in interceptors {
            if let Some(result) = interceptor.read(path).await {
                tracing::trace!(
                    path = %path.display(),
                    interceptor = interceptor.name(),
                    "read from interceptor"
                );
                return result;
            }
        }

        self.disk.read(path).await
    }

    /// Store `text` as the current content of `path`, shadowing disk.
    pub fn set(&self, path: impl Into<PathBuf>, text: &str) {
        self.overlay.set(path.into(), text);
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.overlay.get(path).map(|text| text.to_string())
    }

    /// Drop the overlay entry for `path` so reads fall through to disk.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.disk.forget(path);
        self.overlay.remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.overlay.contains(path)
    }

    pub fn overlay(&self) -> &Arc<BufferOverlay> {
        &self.overlay
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("overlay_entries", &self.overlay.len())
            .field("interceptors", &self.interceptors.read().len())
            .field("disk_cached", &self.disk.cached_len())
            .finish()
    }
}
