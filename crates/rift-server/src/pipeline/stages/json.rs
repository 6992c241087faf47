//! JSON imports.

use async_trait::async_trait;

use super::JSON as STAGE;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse, ResponseBody};

pub struct JsonStage;

impl Stage for JsonStage {
    fn name(&self) -> &str {
        STAGE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(STAGE, Json);
        Ok(())
    }
}

struct Json;

#[async_trait]
impl Middleware for Json {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let wrap = req.path.ends_with(".json") && req.is_import();
        let res = next.run(req).await;
        // Upstream may answer without a body, e.g. 304.
        if !wrap || !res.is_ok() {
            return res;
        }
        if let ResponseBody::Text(json) = &res.body {
            return DevResponse::js(format!("export default {json}"));
        }
        res
    }
}
