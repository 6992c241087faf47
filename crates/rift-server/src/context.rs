//! Shared server context.
//!
//! One `ServerContext` exists per server lifetime. Every pipeline stage is
//! installed against it and every middleware is built from the handles it
//! exposes.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use rift_config::ResolvedConfig;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::content::ContentStore;
use crate::error::{ContentReadError, InstallError};
use crate::gate::ValidityGate;
use crate::hmr::{HmrClients, ModuleRegistry};
use crate::pipeline::{Middleware, Pipeline};
use crate::resolver::PathResolver;
use crate::watcher::ChangeWatcher;

/// A middleware together with the stage that installed it.
#[derive(Clone)]
pub struct InstalledMiddleware {
    pub stage: String,
    pub middleware: Arc<dyn Middleware>,
}

/// Where stages install middlewares and background tasks.
#[derive(Default)]
struct StageHost {
    middlewares: RwLock<Vec<InstalledMiddleware>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle on the listening transport.
struct Transport {
    local_addr: OnceLock<SocketAddr>,
    shutdown: broadcast::Sender<()>,
    closed: AtomicBool,
}

pub struct ServerContext {
    pub root: PathBuf,
    pub config: Arc<ResolvedConfig>,
    pub store: Arc<ContentStore>,
    pub watcher: Arc<ChangeWatcher>,
    pub resolver: Arc<PathResolver>,
    pub modules: Arc<ModuleRegistry>,
    pub clients: Arc<HmrClients>,
    host: StageHost,
    transport: Transport,
}

impl ServerContext {
    pub fn new(config: ResolvedConfig) -> Self {
        Self::with_gate(config, ValidityGate::new())
    }

    pub fn with_gate(config: ResolvedConfig, gate: ValidityGate) -> Self {
        let store = Arc::new(ContentStore::new());
        let watcher = Arc::new(ChangeWatcher::new(
            config.root.clone(),
            Arc::clone(&store),
            gate,
        ));
        let (shutdown, _) = broadcast::channel(1);

        Self {
            root: config.root.clone(),
            resolver: Arc::new(PathResolver::new(&config)),
            config: Arc::new(config),
            store,
            watcher,
            modules: Arc::new(ModuleRegistry::default()),
            clients: Arc::new(HmrClients::new()),
            host: StageHost::default(),
            transport: Transport {
                local_addr: OnceLock::new(),
                shutdown,
                closed: AtomicBool::new(false),
            },
        }
    }

    /// Read the current content of a file through the content store.
    pub async fn read(&self, path: &Path) -> Result<String, ContentReadError> {
        self.store.read(path).await
    }

    /// Append a middleware to the chain. Earlier middlewares wrap later ones.
    pub fn use_middleware(&self, stage: &str, middleware: impl Middleware + 'static) {
        self.host.middlewares.write().push(InstalledMiddleware {
            stage: stage.to_string(),
            middleware: Arc::new(middleware),
        });
    }

    /// Run a background task for the lifetime of the server.
    ///
    /// # Errors
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn spawn<F>(&self, stage: &str, task: F) -> Result<(), InstallError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| InstallError::Stage {
                stage: stage.to_string(),
                message: e.to_string(),
            })?;
        self.host.tasks.lock().push(handle.spawn(task));
        Ok(())
    }

    /// Snapshot of the installed chain.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.host.middlewares.read().clone())
    }

    pub fn installed_stages(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for installed in self.host.middlewares.read().iter() {
            if names.last() != Some(&installed.stage) {
                names.push(installed.stage.clone());
            }
        }
        names
    }

    pub fn set_local_addr(&self, addr: SocketAddr) {
        let _ = self.transport.local_addr.set(addr);
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr.get().copied()
    }

    /// Resolves once [`ServerContext::shutdown`] has been called.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.transport.shutdown.subscribe();
        let already_closed = self.is_shut_down();
        async move {
            if !already_closed {
                let _ = rx.recv().await;
            }
        }
    }

    /// Release the watcher subscription, background tasks, connected clients
    /// and the listener. Calling it again does nothing.
    pub fn shutdown(&self) {
        if self.transport.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!("shutting down server context");
        let _ = self.transport.shutdown.send(());
        self.watcher.unwatch();
        for task in self.host.tasks.lock().drain(..) {
            task.abort();
        }
        self.clients.disconnect_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.transport.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("root", &self.root)
            .field("stages", &self.installed_stages())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let ctx = ServerContext::new(ResolvedConfig::default());
        let signal = ctx.shutdown_signal();

        ctx.shutdown();
        ctx.shutdown();

        assert!(ctx.is_shut_down());
        signal.await;
        // A signal requested after shutdown resolves immediately.
        ctx.shutdown_signal().await;
    }
}
