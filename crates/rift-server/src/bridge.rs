//! Editor buffer bridge.
//!
//! A host editor reports unsaved document text here. Each change is written
//! to the content store, so the server serves what the user sees, and is
//! evaluated by the change watcher like any other edit.
//!
//! Editors talk to the bridge over JSON lines on stdin:
//!
//! ```text
//! {"method":"documentChanged","params":{"uri":"file:///p/src/App.vue","text":"..."}}
//! {"method":"documentClosed","params":{"uri":"file:///p/src/App.vue"}}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use url::Url;

use crate::content::ContentStore;
use crate::context::ServerContext;
use crate::gate::GateDecision;
use crate::watcher::{ChangeEvent, ChangeWatcher};

/// One inbound editor notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum BridgeMessage {
    DocumentChanged { uri: String, text: String },
    DocumentClosed { uri: String },
}

#[derive(Clone)]
pub struct EditorBufferBridge {
    store: Arc<ContentStore>,
    watcher: Arc<ChangeWatcher>,
}

impl EditorBufferBridge {
    pub fn new(ctx: &ServerContext) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            watcher: Arc::clone(&ctx.watcher),
        }
    }

    /// The full text of an open document changed.
    ///
    /// Returns the gate decision, or `None` when the document is not a local
    /// file or lies outside the watched project.
    pub fn document_changed(&self, uri: &str, text: &str) -> Option<GateDecision> {
        let path = file_path(uri)?;
        tracing::debug!(target: "rift::bridge", path = %path.display(), "document changed");
        self.store.set(path.clone(), text);
        self.watcher.handle(ChangeEvent::buffer(path, text))
    }

    /// A document was closed; reads fall back to disk again.
    ///
    /// Returns whether the store held text for it.
    pub fn document_closed(&self, uri: &str) -> bool {
        let Some(path) = file_path(uri) else {
            return false;
        };
        let had_buffer = self.store.invalidate(&path);
        tracing::debug!(target: "rift::bridge", path = %path.display(), had_buffer, "document closed");
        if had_buffer && self.watcher.is_watched(&path) {
            // Unsaved edits were discarded; clients must catch up with disk.
            self.watcher.emit(&path);
        }
        had_buffer
    }

    pub fn dispatch(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::DocumentChanged { uri, text } => {
                self.document_changed(&uri, &text);
            }
            BridgeMessage::DocumentClosed { uri } => {
                self.document_closed(&uri);
            }
        }
    }

    /// Read JSON-line notifications from `reader` until it ends.
    ///
    /// Malformed lines are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only when reading fails.
    pub async fn serve_lines<R>(&self, reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<BridgeMessage>(line) {
                Ok(message) => self.dispatch(message),
                Err(e) => {
                    tracing::warn!(target: "rift::bridge", error = %e, "ignoring malformed message");
                }
            }
        }
        tracing::debug!(target: "rift::bridge", "editor input closed");
        Ok(())
    }

    /// Serve notifications from this process's stdin.
    ///
    /// # Errors
    ///
    /// Returns an error when stdin cannot be read.
    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        tracing::info!(target: "rift::bridge", "reading editor notifications from stdin");
        self.serve_lines(BufReader::new(tokio::io::stdin())).await
    }
}

/// Local path of a `file:` URI. Other schemes are ignored.
fn file_path(uri: &str) -> Option<PathBuf> {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(target: "rift::bridge", uri, error = %e, "invalid document uri");
            return None;
        }
    };
    if url.scheme() != "file" {
        tracing::trace!(target: "rift::bridge", uri, "skipping non-file document");
        return None;
    }
    url.to_file_path().ok()
}
