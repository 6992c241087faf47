//! Import specifier rewriting for served JavaScript.
//!
//! Runs outermost, so every JS body leaving the server has been rewritten no
//! matter which inner stage produced it.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ModuleDeclaration, StringLiteral};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;

use super::module_resolve::split_package_id;
use super::{MODULE_REWRITE, is_script_extension, public_extension};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::hmr::{CLIENT_PATH, ModuleKind, ModuleRegistry};
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};
use crate::resolver::PathResolver;

/// Public prefix for bare (package) imports.
pub const MODULES_PREFIX: &str = "/@modules/";

/// Set by inner stages when a body is served under a different path than
/// the file it came from; relative imports resolve against it.
pub(crate) const IMPORTER_HEADER: &str = "x-rift-importer";

static DYNAMIC_IMPORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).ok());

pub struct ModuleRewriteStage;

impl Stage for ModuleRewriteStage {
    fn name(&self) -> &str {
        MODULE_REWRITE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            MODULE_REWRITE,
            ModuleRewrite {
                resolver: Arc::clone(&ctx.resolver),
                modules: Arc::clone(&ctx.modules),
            },
        );
        Ok(())
    }
}

struct ModuleRewrite {
    resolver: Arc<PathResolver>,
    modules: Arc<ModuleRegistry>,
}

#[async_trait]
impl Middleware for ModuleRewrite {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let path = req.path.clone();
        let mut res = next.run(req).await;
        if !res.is_ok() || !res.is_js() {
            return res;
        }

        let importer = res
            .headers
            .get(IMPORTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| path.clone(), str::to_string);

        if let Some(source) = res.text_body() {
            let rewritten = rewrite_imports(source, &importer, &self.resolver);
            res.set_text(rewritten);
        }

        self.register(&path);
        res
    }
}

impl ModuleRewrite {
    fn register(&self, public_path: &str) {
        if public_path.starts_with(MODULES_PREFIX) || public_path == CLIENT_PATH {
            return;
        }
        let Some(file) = self.resolver.request_to_file(public_path) else {
            return;
        };
        let kind = match public_extension(public_path) {
            Some("vue") => ModuleKind::Component,
            Some("css") => ModuleKind::Style,
            _ => ModuleKind::Script,
        };
        self.modules.register(file, public_path.to_string(), kind);
    }
}

/// Rewrite the import specifiers of `source`, a module served at `importer`.
///
/// Bare specifiers become `/@modules/<id>`, aliases apply, relative imports
/// become absolute public paths with their extension filled in, and imports
/// of non-script files get an `import` query flag. Sources that fail to
/// parse are returned unchanged.
pub fn rewrite_imports(source: &str, importer: &str, resolver: &PathResolver) -> String {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if ret.panicked {
        tracing::warn!(importer, "could not parse module, serving it unchanged");
        return source.to_string();
    }

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    for stmt in &ret.program.body {
        let literal: Option<&StringLiteral> = match stmt.as_module_declaration() {
            Some(ModuleDeclaration::ImportDeclaration(decl)) => Some(&decl.source),
            Some(ModuleDeclaration::ExportNamedDeclaration(decl)) => decl.source.as_ref(),
            Some(ModuleDeclaration::ExportAllDeclaration(decl)) => Some(&decl.source),
            _ => None,
        };
        let Some(literal) = literal else {
            continue;
        };
        // Span covers the quotes.
        let start = literal.span.start as usize + 1;
        let end = (literal.span.end as usize).saturating_sub(1);
        if start > end {
            continue;
        }
        if let Some(rewritten) = rewrite_specifier(literal.value.as_str(), importer, resolver) {
            edits.push((start, end, rewritten));
        }
    }

    let dynamic = DYNAMIC_IMPORT.iter().flat_map(|re| re.captures_iter(source));
    for caps in dynamic {
        let Some(m) = caps.get(1) else {
            continue;
        };
        if edits.iter().any(|(s, e, _)| m.start() < *e && *s < m.end()) {
            continue;
        }
        if let Some(rewritten) = rewrite_specifier(m.as_str(), importer, resolver) {
            edits.push((m.start(), m.end(), rewritten));
        }
    }

    if edits.is_empty() {
        return source.to_string();
    }

    edits.sort_by_key(|(start, _, _)| *start);
    let mut out = String::with_capacity(source.len() + edits.len() * 16);
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        if start < cursor {
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// New form of one specifier, or `None` when it stays as written.
fn rewrite_specifier(specifier: &str, importer: &str, resolver: &PathResolver) -> Option<String> {
    let aliased = resolver.alias(specifier);
    let spec = aliased.as_deref().unwrap_or(specifier);

    if is_url(spec) || spec.starts_with(MODULES_PREFIX) {
        return aliased;
    }

    let (path, query) = match spec.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (spec, None),
    };

    let (public, has_file_name) = if path.starts_with('/') {
        (resolver.with_implicit_extension(path), true)
    } else if is_relative(path) {
        (resolver.with_implicit_extension(&join_public(importer, path)), true)
    } else {
        // Package names may contain dots; only a subpath names a file.
        let (_, subpath) = split_package_id(path);
        (format!("{MODULES_PREFIX}{path}"), subpath.is_some())
    };

    let needs_import_flag = has_file_name
        && public_extension(&public).is_some_and(|ext| !is_script_extension(ext))
        && !query.is_some_and(|q| q.split('&').any(|pair| pair == "import"));

    let mut rewritten = public;
    match (query, needs_import_flag) {
        (Some(query), true) => {
            rewritten.push('?');
            rewritten.push_str(query);
            rewritten.push_str("&import");
        }
        (Some(query), false) => {
            rewritten.push('?');
            rewritten.push_str(query);
        }
        (None, true) => rewritten.push_str("?import"),
        (None, false) => {}
    }

    (rewritten != specifier).then_some(rewritten)
}

fn is_url(spec: &str) -> bool {
    spec.contains("://") || spec.starts_with("//") || spec.starts_with("data:")
}

fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Resolve `spec` against the directory of `importer`, both public paths.
fn join_public(importer: &str, spec: &str) -> String {
    let base = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for part in spec.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
