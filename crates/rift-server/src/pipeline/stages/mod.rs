//! Built-in stages, one module per stage.

mod assets;
mod compile;
mod css;
mod hmr;
mod html_rewrite;
mod json;
mod module_resolve;
mod module_rewrite;
mod proxy;
mod request_log;
mod service_worker;
mod sfc;
mod static_files;
mod transforms;

pub use assets::AssetsStage;
pub use compile::{CompileOptions, CompileStage, JsxMode, transpile};
pub use css::{CssStage, css_module};
pub use hmr::HmrStage;
pub use html_rewrite::{HtmlRewriteStage, rewrite_html};
pub use json::JsonStage;
pub use module_resolve::{ModuleResolveStage, resolve_package_entry};
pub use module_rewrite::{MODULES_PREFIX, ModuleRewriteStage, rewrite_imports};
pub use proxy::ProxyStage;
pub use request_log::RequestLogStage;
pub use service_worker::{SW_PATH, ServiceWorkerStage};
pub use sfc::SfcStage;
pub use static_files::StaticStage;
pub use transforms::TransformsStage;

use std::path::PathBuf;

use axum::http::StatusCode;

use crate::content::ContentStore;
use crate::request::DevResponse;
use crate::resolver::PathResolver;

pub const MODULE_REWRITE: &str = "module-rewrite";
pub const HTML_REWRITE: &str = "html-rewrite";
pub const MODULE_RESOLVE: &str = "module-resolve";
pub const PROXY: &str = "proxy";
pub const SERVICE_WORKER: &str = "service-worker";
pub const HMR: &str = "hmr";
pub const TRANSFORMS: &str = "transforms";
pub const SFC: &str = "sfc";
pub const CSS: &str = "css";
pub const COMPILE: &str = "compile";
pub const JSON: &str = "json";
pub const ASSETS: &str = "assets";
pub const STATIC: &str = "static";
pub const REQUEST_LOG: &str = "request-log";

/// Extensions browsers can import as script modules once served.
pub(crate) fn is_script_extension(ext: &str) -> bool {
    matches!(
        ext,
        "js" | "mjs" | "cjs" | "ts" | "mts" | "cts" | "jsx" | "tsx" | "vue"
    )
}

/// Extension of the last segment of a public path, query excluded.
pub(crate) fn public_extension(path: &str) -> Option<&str> {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let name = path.rsplit('/').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Read the file behind `public_path` through the content store.
///
/// Errors are already turned into the response to send: 404 for a missing
/// file, 500 for anything else.
pub(crate) async fn read_source(
    store: &ContentStore,
    resolver: &PathResolver,
    public_path: &str,
) -> Result<(PathBuf, String), DevResponse> {
    let Some(file) = resolver.request_to_file(public_path) else {
        return Err(DevResponse::not_found(public_path));
    };
    match store.read(&file).await {
        Ok(text) => Ok((file, text)),
        Err(e) if e.is_not_found() => Err(DevResponse::not_found(public_path)),
        Err(e) => {
            tracing::warn!(path = public_path, error = %e, "read failed");
            Err(DevResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// JSON string literal for `text`.
pub(crate) fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_ignores_query() {
        assert_eq!(public_extension("/a/b.css?import"), Some("css"));
        assert_eq!(public_extension("/a.b/c"), None);
        assert!(is_script_extension("vue"));
        assert!(!is_script_extension("json"));
    }

    #[test]
    fn js_string_escapes() {
        assert_eq!(js_string("a\"b\n"), r#""a\"b\n""#);
    }
}
