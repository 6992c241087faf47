//! Hot-update endpoints and the watcher-to-client bridge.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::HMR;
use crate::content::ContentStore;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::hmr::{CLIENT_PATH, HMR_PATH, HmrClients, HmrMessage, ModuleKind, ModuleRegistry};
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};
use crate::resolver::PathResolver;

const CLIENT_SCRIPT: &str = include_str!("../../../assets/client.js");

pub struct HmrStage;

impl Stage for HmrStage {
    fn name(&self) -> &str {
        HMR
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        let notifier = ChangeNotifier {
            store: Arc::clone(&ctx.store),
            modules: Arc::clone(&ctx.modules),
            resolver: Arc::clone(&ctx.resolver),
            clients: Arc::clone(&ctx.clients),
        };
        let mut changes = ctx.watcher.subscribe();
        ctx.spawn(HMR, async move {
            loop {
                match changes.recv().await {
                    Ok(path) => notifier.notify(&path).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "rift::hmr", skipped, "dropped change events, reloading");
                        notifier
                            .clients
                            .broadcast(&HmrMessage::FullReload { path: None });
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })?;

        ctx.use_middleware(
            HMR,
            HmrEndpoints {
                clients: Arc::clone(&ctx.clients),
            },
        );
        Ok(())
    }
}

struct HmrEndpoints {
    clients: Arc<HmrClients>,
}

#[async_trait]
impl Middleware for HmrEndpoints {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        match req.path.as_str() {
            CLIENT_PATH => DevResponse::js(CLIENT_SCRIPT),
            HMR_PATH => self.connect(),
            _ => next.run(req).await,
        }
    }
}

impl HmrEndpoints {
    fn connect(&self) -> DevResponse {
        let (id, rx) = self.clients.register();
        tracing::debug!(target: "rift::hmr", id, clients = self.clients.count(), "client subscribed");

        let connected = serde_json::to_string(&HmrMessage::Connected).unwrap_or_default();
        let stream = tokio_stream::once(connected)
            .chain(ReceiverStream::new(rx))
            .map(|data| Ok::<_, Infallible>(Event::default().data(data)));

        let sse = Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        );
        DevResponse::from_response(sse.into_response())
    }
}

/// Turns `change(path)` into the message clients need.
struct ChangeNotifier {
    store: Arc<ContentStore>,
    modules: Arc<ModuleRegistry>,
    resolver: Arc<PathResolver>,
    clients: Arc<HmrClients>,
}

impl ChangeNotifier {
    async fn notify(&self, path: &Path) {
        let message = self.message_for(path).await;
        tracing::debug!(target: "rift::hmr", path = %path.display(), ?message, "sending update");
        self.clients.broadcast(&message);
    }

    async fn message_for(&self, path: &Path) -> HmrMessage {
        let Some((public_path, kind)) = self.modules.lookup(path) else {
            return HmrMessage::FullReload {
                path: self.resolver.file_to_request(path),
            };
        };

        let content = match self.store.read(path).await {
            Ok(content) => content,
            Err(_) => {
                // Gone from disk; the page may still reference it.
                self.modules.forget(path);
                return HmrMessage::FullReload {
                    path: Some(public_path),
                };
            }
        };

        match kind {
            ModuleKind::Style => HmrMessage::style_update(public_path, &content),
            ModuleKind::Script | ModuleKind::Component => HmrMessage::update(public_path, &content),
        }
    }
}
