//! Hot-update protocol: connected clients, served modules and messages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// SSE endpoint clients connect to.
pub const HMR_PATH: &str = "/__rift_hmr";
/// Client runtime script.
pub const CLIENT_PATH: &str = "/__rift_client.js";

/// Messages queued per client before it counts as stalled.
pub const CLIENT_QUEUE: usize = 100;

/// Messages pushed to browser clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    Connected,
    /// A served module changed; re-import it.
    Update {
        path: String,
        hash: String,
        timestamp: u64,
    },
    /// A served stylesheet changed; swap it in place.
    StyleUpdate {
        path: String,
        hash: String,
        timestamp: u64,
    },
    FullReload {
        path: Option<String>,
    },
}

impl HmrMessage {
    pub fn update(path: String, content: &str) -> Self {
        HmrMessage::Update {
            path,
            hash: content_hash(content),
            timestamp: now_millis(),
        }
    }

    pub fn style_update(path: String, content: &str) -> Self {
        HmrMessage::StyleUpdate {
            path,
            hash: content_hash(content),
            timestamp: now_millis(),
        }
    }
}

/// Short blake3 digest used to tag module versions.
pub fn content_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What kind of module a served file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Style,
    Component,
}

/// Files served to clients as modules, keyed by path on disk.
///
/// Only changes to registered modules can be hot-updated; anything else
/// triggers a full reload.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: DashMap<PathBuf, (String, ModuleKind)>,
}

impl ModuleRegistry {
    pub fn register(&self, file: PathBuf, public_path: String, kind: ModuleKind) {
        self.modules.insert(file, (public_path, kind));
    }

    pub fn lookup(&self, file: &Path) -> Option<(String, ModuleKind)> {
        self.modules.get(file).map(|entry| entry.value().clone())
    }

    pub fn forget(&self, file: &Path) {
        self.modules.remove(file);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Connected SSE clients.
#[derive(Debug, Default)]
pub struct HmrClients {
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_id: AtomicUsize,
}

impl HmrClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client.
    ///
    /// # Returns
    ///
    /// Client ID and receiver for serialized messages
    pub fn register(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        self.clients.write().insert(id, tx);
        tracing::debug!(target: "rift::hmr", id, "client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    /// Send `message` to every client without waiting on any of them.
    ///
    /// Clients that went away, or whose queue is full because they stopped
    /// reading, are dropped. Dropping the sender ends their event stream and
    /// the browser reconnects.
    pub fn broadcast(&self, message: &HmrMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(target: "rift::hmr", error = %e, "failed to serialize message");
                return;
            }
        };

        let clients = self.clients.read().clone();

        let mut failed_ids = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(target: "rift::hmr", id, "client not reading, dropping it");
                    failed_ids.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(target: "rift::hmr", id, "client disconnected");
                    failed_ids.push(id);
                }
            }
        }

        for id in failed_ids {
            self.unregister(id);
        }
    }

    /// Drop every client, ending their event streams.
    pub fn disconnect_all(&self) {
        self.clients.write().clear();
    }

    pub fn count(&self) -> usize {
        self.clients.read().len()
    }
}

pub type SharedClients = Arc<HmrClients>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_kebab_case_tag() {
        let json = serde_json::to_value(HmrMessage::FullReload {
            path: Some("/index.html".into()),
        })
        .unwrap();
        assert_eq!(json["type"], "full-reload");

        let json = serde_json::to_value(HmrMessage::style_update("/a.css".into(), "a{}")).unwrap();
        assert_eq!(json["type"], "style-update");
        assert_eq!(json["hash"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn hash_tracks_content() {
        assert_eq!(content_hash("a"), content_hash("a"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[tokio::test]
    async fn broadcast_reaches_clients_and_prunes_closed_ones() {
        let clients = HmrClients::new();
        let (_a, mut rx_a) = clients.register();
        let (_b, rx_b) = clients.register();
        drop(rx_b);
        assert_eq!(clients.count(), 2);

        clients.broadcast(&HmrMessage::Connected);

        assert_eq!(rx_a.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(clients.count(), 1);
    }

    #[tokio::test]
    async fn stalled_client_does_not_hold_up_the_others() {
        let clients = HmrClients::new();
        let (_stalled, _never_read) = clients.register();
        let (_live, mut rx_live) = clients.register();

        for _ in 0..=CLIENT_QUEUE {
            clients.broadcast(&HmrMessage::Connected);
            assert!(rx_live.recv().await.is_some());
        }

        assert_eq!(clients.count(), 1);
        clients.broadcast(&HmrMessage::FullReload { path: None });
        assert_eq!(
            rx_live.recv().await.unwrap(),
            r#"{"type":"full-reload","path":null}"#
        );
    }

    #[test]
    fn registry_lookup() {
        let registry = ModuleRegistry::default();
        let file = PathBuf::from("/p/src/main.js");
        registry.register(file.clone(), "/src/main.js".into(), ModuleKind::Script);
        assert_eq!(
            registry.lookup(&file),
            Some(("/src/main.js".to_string(), ModuleKind::Script))
        );
        registry.forget(&file);
        assert!(registry.is_empty());
    }
}
