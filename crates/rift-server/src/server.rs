//! HTTP transport: axum in front of the middleware pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rift_config::ResolvedConfig;
use tower_http::cors::{Any, CorsLayer};

use crate::context::ServerContext;
use crate::error::{Result, ServerError};
use crate::gate::ValidityGate;
use crate::pipeline::{self, Pipeline, StageRegistry};
use crate::request::{DevRequest, DevResponse};

/// Largest request body read into memory.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Development server.
pub struct DevServer {
    ctx: Arc<ServerContext>,
    stages: Vec<String>,
}

impl DevServer {
    /// Create a server for `config` with every stage installed.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to install.
    pub fn new(config: ResolvedConfig, registry: &StageRegistry) -> Result<Self> {
        Self::with_gate(config, registry, ValidityGate::new())
    }

    /// Like [`DevServer::new`] with a custom validity policy.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to install.
    pub fn with_gate(
        config: ResolvedConfig,
        registry: &StageRegistry,
        gate: ValidityGate,
    ) -> Result<Self> {
        let ctx = Arc::new(ServerContext::with_gate(config, gate));
        let config = Arc::clone(&ctx.config);
        let stages = pipeline::build(&ctx, &config, registry)?;
        tracing::debug!(stages = ?stages, "pipeline built");
        Ok(Self { ctx, stages })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Installed stage names, outermost first.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Build the axum router.
    ///
    /// Every request goes through the pipeline. CORS is open for
    /// development.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.ctx.pipeline())
    }

    /// Bind `addr`, start watching the project and serve until
    /// [`DevServer::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound, the watcher cannot
    /// start, or the server fails.
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        self.ctx.set_local_addr(local_addr);

        self.ctx.watcher.watch_disk()?;

        tracing::info!(addr = %local_addr, root = %self.ctx.root.display(), "dev server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.ctx.shutdown_signal())
            .await
            .map_err(ServerError::Serve)?;

        // Covers exits not caused by shutdown().
        self.ctx.shutdown();
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.ctx.local_addr()
    }

    /// Stop the server. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        self.ctx.shutdown();
    }
}

/// Run one request through the pipeline.
async fn handle_request(State(pipeline): State<Pipeline>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return DevResponse::error(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };

    let req = DevRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    let method = req.method.clone();
    let mut response = pipeline.handle(req).await.into_response();
    if method == axum::http::Method::HEAD {
        *response.body_mut() = Body::empty();
    }
    response
}
