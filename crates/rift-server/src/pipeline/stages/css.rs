//! Stylesheet serving.
//!
//! Plain loads get `text/css`. Imports from script get a module that
//! installs the stylesheet through the client and exports its text.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CSS as STAGE, js_string};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::hmr::{CLIENT_PATH, ModuleKind, ModuleRegistry, content_hash};
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{CSS, DevRequest, DevResponse};
use crate::resolver::PathResolver;

pub struct CssStage;

impl Stage for CssStage {
    fn name(&self) -> &str {
        STAGE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            STAGE,
            Css {
                resolver: Arc::clone(&ctx.resolver),
                modules: Arc::clone(&ctx.modules),
            },
        );
        Ok(())
    }
}

struct Css {
    resolver: Arc<PathResolver>,
    modules: Arc<ModuleRegistry>,
}

#[async_trait]
impl Middleware for Css {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if !req.path.ends_with(".css") {
            return next.run(req).await;
        }

        let path = req.path.clone();
        let is_import = req.is_import();
        let mut res = next.run(req).await;
        if !res.is_ok() {
            return res;
        }

        if let Some(file) = self.resolver.request_to_file(&path) {
            self.modules.register(file, path.clone(), ModuleKind::Style);
        }

        if is_import {
            if let Some(css) = res.text_body() {
                return DevResponse::js(css_module(&path, css));
            }
        }
        res.set_content_type(CSS);
        res
    }
}

/// Script module for a stylesheet imported from JavaScript.
pub fn css_module(public_path: &str, css: &str) -> String {
    let id = content_hash(public_path);
    format!(
        "import {{ updateStyle }} from \"{CLIENT_PATH}\"\n\
         const css = {}\n\
         updateStyle(\"{}\", \"{public_path}\")\n\
         export default css\n",
        js_string(css),
        &id[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_links_stylesheet_and_exports_text() {
        let code = css_module("/src/a.css", ".a { color: red }");
        assert!(code.contains(&format!("from \"{CLIENT_PATH}\"")));
        assert!(code.contains("const css = \".a { color: red }\""));
        assert!(code.contains("\"/src/a.css\")"));
        assert!(code.ends_with("export default css\n"));
    }
}
