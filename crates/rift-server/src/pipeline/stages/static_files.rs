//! Default file serving, the innermost stage.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode, header};

use super::{STATIC, public_extension};
use crate::content::ContentStore;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse, content_type_for, is_text_extension};
use crate::resolver::PathResolver;

const INDEX: &str = "index.html";

pub struct StaticStage;

impl Stage for StaticStage {
    fn name(&self) -> &str {
        STATIC
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            STATIC,
            StaticFiles {
                store: Arc::clone(&ctx.store),
                resolver: Arc::clone(&ctx.resolver),
            },
        );
        Ok(())
    }
}

struct StaticFiles {
    store: Arc<ContentStore>,
    resolver: Arc<PathResolver>,
}

#[async_trait]
impl Middleware for StaticFiles {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if req.method != Method::GET && req.method != Method::HEAD {
            return next.run(req).await;
        }

        let public_path = if req.path.ends_with('/') {
            format!("{}{INDEX}", req.path)
        } else {
            req.path.clone()
        };

        if let Some(res) = self.serve(&public_path).await {
            return res;
        }

        // Client-side routes: extensionless document requests get the app shell.
        if public_extension(&req.path).is_none() && accepts_html(&req) {
            if let Some(res) = self.serve(&format!("/{INDEX}")).await {
                return res;
            }
        }

        next.run(req).await
    }
}

impl StaticFiles {
    /// Serve one public path, or `None` when nothing backs it.
    async fn serve(&self, public_path: &str) -> Option<DevResponse> {
        let mut file = self.resolver.request_to_file(public_path)?;
        if is_dir(&file).await {
            file = file.join(INDEX);
        }
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if is_text_extension(&ext) {
            match self.store.read(&file).await {
                Ok(text) => Some(DevResponse::text(content_type_for(&ext), text)),
                Err(e) if e.is_not_found() => None,
                Err(e) => Some(read_failed(&file, e)),
            }
        } else {
            match tokio::fs::read(&file).await {
                Ok(bytes) => Some(DevResponse::binary(content_type_for(&ext), bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => Some(read_failed(&file, e)),
            }
        }
    }
}

fn read_failed(file: &Path, error: impl std::fmt::Display) -> DevResponse {
    tracing::warn!(path = %file.display(), error = %error, "failed to serve file");
    DevResponse::error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

fn accepts_html(req: &DevRequest) -> bool {
    req.headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir())
}
