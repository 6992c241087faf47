//! `request-log`: a stage users can enable through `configureServer`.

use std::time::Instant;

use async_trait::async_trait;

use super::REQUEST_LOG;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};

pub struct RequestLogStage;

impl Stage for RequestLogStage {
    fn name(&self) -> &str {
        REQUEST_LOG
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(REQUEST_LOG, RequestLog);
        Ok(())
    }
}

struct RequestLog;

#[async_trait]
impl Middleware for RequestLog {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let method = req.method.clone();
        let url = req.url();
        let started = Instant::now();

        let res = next.run(req).await;

        tracing::info!(
            %method,
            url = %url,
            status = res.status.as_u16(),
            content_type = res.content_type().unwrap_or("-"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        res
    }
}
