//! Client injection for served HTML documents.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::{Captures, Regex};

use super::{HTML_REWRITE, rewrite_imports};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::hmr::CLIENT_PATH;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};
use crate::resolver::PathResolver;

/// Env keys with this prefix are exposed to the page.
const PUBLIC_ENV_PREFIX: &str = "RIFT_";

static INLINE_MODULE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?is)(<script\b[^>]*\btype\s*=\s*["']module["'][^>]*>)(.*?)(</script>)"#).ok()
});

static HEAD_OPEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").ok());

pub struct HtmlRewriteStage;

impl Stage for HtmlRewriteStage {
    fn name(&self) -> &str {
        HTML_REWRITE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        let preamble = client_preamble(
            &ctx.config.mode,
            &ctx.config.env,
            ctx.config.server.service_worker,
        );
        ctx.use_middleware(
            HTML_REWRITE,
            HtmlRewrite {
                resolver: Arc::clone(&ctx.resolver),
                preamble,
            },
        );
        Ok(())
    }
}

struct HtmlRewrite {
    resolver: Arc<PathResolver>,
    preamble: String,
}

#[async_trait]
impl Middleware for HtmlRewrite {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let path = req.path.clone();
        let mut res = next.run(req).await;
        if !res.is_ok() || !res.is_html() {
            return res;
        }
        if let Some(html) = res.text_body() {
            let rewritten = rewrite_html(html, &path, &self.preamble, &self.resolver);
            res.set_text(rewritten);
        }
        res
    }
}

/// Scripts injected into every page: the env object, the service worker
/// flag and the hot-update client.
fn client_preamble(mode: &str, env: &IndexMap<String, String>, service_worker: bool) -> String {
    let mut public = serde_json::Map::new();
    public.insert("MODE".to_string(), mode.into());
    for (key, value) in env {
        if key.starts_with(PUBLIC_ENV_PREFIX) {
            public.insert(key.clone(), value.as_str().into());
        }
    }
    // A literal `</script>` in a value would end the inline script.
    let env_json = serde_json::Value::Object(public)
        .to_string()
        .replace('<', "\\u003c");

    format!(
        "<script>window.__RIFT_ENV__ = {env_json}; window.__RIFT_SW__ = {service_worker};</script>\n\
         <script type=\"module\" src=\"{CLIENT_PATH}\"></script>\n"
    )
}

/// Inject `preamble` and rewrite the imports of inline module scripts.
pub fn rewrite_html(html: &str, page: &str, preamble: &str, resolver: &PathResolver) -> String {
    let html = match INLINE_MODULE.as_ref() {
        Some(re) => re
            .replace_all(html, |caps: &Captures<'_>| {
                format!(
                    "{}{}{}",
                    &caps[1],
                    rewrite_imports(&caps[2], page, resolver),
                    &caps[3]
                )
            })
            .into_owned(),
        None => html.to_string(),
    };

    let head_end = HEAD_OPEN
        .as_ref()
        .and_then(|re| re.find(&html))
        .map(|m| m.end());
    match head_end {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + preamble.len() + 1);
            out.push_str(&html[..at]);
            out.push('\n');
            out.push_str(preamble);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{preamble}{html}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_config::ResolvedConfig;
    use std::path::PathBuf;

    fn resolver() -> PathResolver {
        PathResolver::new(&ResolvedConfig {
            root: PathBuf::from("/project"),
            ..Default::default()
        })
    }

    #[test]
    fn preamble_exposes_prefixed_env_only() {
        let mut env = IndexMap::new();
        env.insert("RIFT_API".to_string(), "https://api".to_string());
        env.insert("SECRET".to_string(), "hunter2".to_string());
        let preamble = client_preamble("development", &env, false);

        assert!(preamble.contains(r#""RIFT_API":"https://api""#));
        assert!(preamble.contains(r#""MODE":"development""#));
        assert!(!preamble.contains("hunter2"));
        assert!(preamble.contains("window.__RIFT_SW__ = false"));
        assert!(preamble.contains(CLIENT_PATH));
    }

    #[test]
    fn env_values_cannot_close_the_script() {
        let mut env = IndexMap::new();
        env.insert(
            "RIFT_BANNER".to_string(),
            "</script><script>alert(1)</script>".to_string(),
        );
        let preamble = client_preamble("development", &env, false);

        assert!(preamble.contains(r#""RIFT_BANNER":"\u003c/script>\u003cscript>"#));
        assert_eq!(preamble.matches("</script>").count(), 2);
    }

    #[test]
    fn injects_after_head_and_rewrites_inline_modules() {
        let html = "<html><head><title>x</title></head><body>\
                    <script type=\"module\">import { createApp } from 'vue'</script></body></html>";
        let out = rewrite_html(html, "/index.html", "<!--client-->\n", &resolver());

        assert!(out.starts_with("<html><head>\n<!--client-->\n<title>"));
        assert!(out.contains("from '/@modules/vue'"));
    }

    #[test]
    fn prepends_without_head() {
        let out = rewrite_html("<p>hi</p>", "/", "<!--client-->", &resolver());
        assert_eq!(out, "<!--client--><p>hi</p>");
    }
}
