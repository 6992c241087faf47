//! Asset imports resolve to the asset's public URL.

use async_trait::async_trait;

use super::{ASSETS, is_script_extension, js_string, public_extension};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};

pub struct AssetsStage;

impl Stage for AssetsStage {
    fn name(&self) -> &str {
        ASSETS
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(ASSETS, Assets);
        Ok(())
    }
}

struct Assets;

fn is_asset(path: &str) -> bool {
    public_extension(path)
        .is_some_and(|ext| !is_script_extension(ext) && !matches!(ext, "css" | "json" | "html"))
}

#[async_trait]
impl Middleware for Assets {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if req.is_import() && is_asset(&req.path) {
            return DevResponse::js(format!("export default {}", js_string(&req.path)));
        }
        next.run(req).await
    }
}
