//! Single-file component (`.vue`) serving.
//!
//! A component is served as several modules:
//!
//! - `App.vue`: the main module, the script block with the other parts wired in
//! - `App.vue?type=template`: the template, as a string for the runtime compiler
//! - `App.vue?type=style&index=N`: style block `N` as `text/css`
//! - `App.vue?type=custom&index=N`: custom block `N`, served by the transforms stage

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ModuleDeclaration, ModuleExportName};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use super::compile::CompileOptions;
use super::{SFC, js_string, read_source, transpile};
use crate::content::ContentStore;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::hmr::{CLIENT_PATH, content_hash};
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{CSS, DevRequest, DevResponse};
use crate::resolver::PathResolver;
use crate::sfc::{self, SfcDescriptor};

const SCRIPT_BINDING: &str = "__script";

pub struct SfcStage;

impl Stage for SfcStage {
    fn name(&self) -> &str {
        SFC
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            SFC,
            Sfc {
                store: Arc::clone(&ctx.store),
                resolver: Arc::clone(&ctx.resolver),
                options: CompileOptions::from_config(&ctx.config),
                custom_blocks: ctx
                    .config
                    .custom_block_transforms
                    .keys()
                    .cloned()
                    .collect(),
            },
        );
        Ok(())
    }
}

struct Sfc {
    store: Arc<ContentStore>,
    resolver: Arc<PathResolver>,
    options: CompileOptions,
    /// Custom block kinds with a registered transform.
    custom_blocks: Vec<String>,
}

#[async_trait]
impl Middleware for Sfc {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if !req.path.ends_with(".vue") {
            return next.run(req).await;
        }

        let (file, source) = match read_source(&self.store, &self.resolver, &req.path).await {
            Ok(found) => found,
            Err(res) => return res,
        };
        let parsed = sfc::parse(&source);
        if !parsed.is_clean() {
            tracing::debug!(
                path = %req.path,
                errors = parsed.errors.len(),
                "serving component with structural errors"
            );
        }
        let descriptor = parsed.descriptor;

        let section = req.query_param("type").map(str::to_string);
        match section.as_deref() {
            None => match self.main_module(&req.path, &file, &descriptor) {
                Ok(code) => DevResponse::js(code),
                Err(message) => {
                    tracing::warn!(path = %req.path, "component compile failed:\n{message}");
                    DevResponse::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Failed to compile {}:\n{message}", req.path),
                    )
                }
            },
            Some("template") => {
                let template = descriptor
                    .template
                    .as_ref()
                    .map_or("", |block| block.content.as_str());
                DevResponse::js(format!("export const template = {}\n", js_string(template)))
            }
            Some("style") => {
                let block = req
                    .query_param("index")
                    .and_then(|i| i.parse::<usize>().ok())
                    .and_then(|i| descriptor.styles.get(i));
                match block {
                    Some(block) => DevResponse::text(CSS, block.content.clone()),
                    None => DevResponse::not_found(&req.url()),
                }
            }
            Some(_) => next.run(req).await,
        }
    }
}

impl Sfc {
    fn main_module(
        &self,
        public_path: &str,
        file: &Path,
        descriptor: &SfcDescriptor,
    ) -> Result<String, String> {
        let hash = content_hash(public_path);
        let id = &hash[..8];
        let mut code = String::new();

        match &descriptor.script {
            Some(script) => {
                let js = match script.lang() {
                    Some(lang @ ("ts" | "tsx" | "jsx")) => transpile(
                        &script.content,
                        Path::new(&format!("component.{lang}")),
                        &self.options,
                    )?,
                    _ => script.content.clone(),
                };
                code.push_str(&rewrite_default_export(&js, SCRIPT_BINDING)?);
                code.push('\n');
            }
            None => {
                let _ = writeln!(code, "const {SCRIPT_BINDING} = {{}}");
            }
        }

        if !descriptor.styles.is_empty() {
            let _ = writeln!(code, "import {{ updateStyle }} from \"{CLIENT_PATH}\"");
            for index in 0..descriptor.styles.len() {
                let _ = writeln!(
                    code,
                    "updateStyle(\"{id}-{index}\", \"{public_path}?type=style&index={index}\")"
                );
            }
        }

        if descriptor.template.is_some() {
            let _ = writeln!(
                code,
                "import {{ template as __template }} from \"{public_path}?type=template\"\n\
                 if (!{SCRIPT_BINDING}.render && !{SCRIPT_BINDING}.template) {SCRIPT_BINDING}.template = __template"
            );
        }

        for (index, block) in descriptor.custom_blocks.iter().enumerate() {
            if !self.custom_blocks.contains(&block.kind) {
                continue;
            }
            let _ = writeln!(
                code,
                "import __block{index} from \"{public_path}?type=custom&index={index}&blockType={}\"\n\
                 if (typeof __block{index} === 'function') __block{index}({SCRIPT_BINDING})",
                block.kind
            );
        }

        let _ = writeln!(code, "{SCRIPT_BINDING}.__hmrId = \"{id}\"");
        let _ = writeln!(
            code,
            "{SCRIPT_BINDING}.__file = {}",
            js_string(&file.to_string_lossy())
        );
        let _ = writeln!(code, "export default {SCRIPT_BINDING}");
        Ok(code)
    }
}

/// Turn `export default <expr>` into `const <binding> = <expr>`.
///
/// A script without a default export gets an empty object binding.
fn rewrite_default_export(script: &str, binding: &str) -> Result<String, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, script, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(ret
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"));
    }

    for stmt in &ret.program.body {
        match stmt.as_module_declaration() {
            Some(ModuleDeclaration::ExportDefaultDeclaration(decl)) => {
                let start = decl.span.start as usize;
                let value_start = decl.declaration.span().start as usize;
                return Ok(format!(
                    "{}const {binding} = {}",
                    &script[..start],
                    &script[value_start..]
                ));
            }
            Some(ModuleDeclaration::ExportNamedDeclaration(decl))
                if decl.specifiers.iter().any(|s| is_default(&s.exported)) =>
            {
                return Err("component scripts must use `export default`".to_string());
            }
            _ => {}
        }
    }

    Ok(format!("{script}\nconst {binding} = {{}}"))
}

fn is_default(name: &ModuleExportName<'_>) -> bool {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.as_str() == "default",
        ModuleExportName::IdentifierReference(id) => id.name.as_str() == "default",
        ModuleExportName::StringLiteral(lit) => lit.value.as_str() == "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_config::ResolvedConfig;
    use std::path::PathBuf;

    fn stage(custom_blocks: Vec<String>) -> Sfc {
        Sfc {
            store: Arc::new(ContentStore::new()),
            resolver: Arc::new(PathResolver::new(&ResolvedConfig {
                root: PathBuf::from("/p"),
                ..Default::default()
            })),
            options: CompileOptions::default(),
            custom_blocks,
        }
    }

    #[test]
    fn default_export_becomes_binding() {
        let out = rewrite_default_export(
            "import a from 'a'\nexport default { name: 'App' }\n",
            "__script",
        )
        .unwrap();
        assert_eq!(out, "import a from 'a'\nconst __script = { name: 'App' }\n");
    }

    #[test]
    fn missing_default_export_gets_empty_object() {
        let out = rewrite_default_export("const a = 1", "__script").unwrap();
        assert!(out.ends_with("const __script = {}"));
    }

    #[test]
    fn main_module_wires_sections() {
        let source = "<template><div/></template>\n\
                      <script>export default { name: 'App' }</script>\n\
                      <style>.a{}</style>\n\
                      <i18n>{}</i18n>\n<docs>x</docs>";
        let descriptor = sfc::parse(source).descriptor;
        let code = stage(vec!["i18n".to_string()])
            .main_module("/src/App.vue", Path::new("/p/src/App.vue"), &descriptor)
            .unwrap();

        assert!(code.contains("const __script = { name: 'App' }"));
        assert!(code.contains("\"/src/App.vue?type=style&index=0\""));
        assert!(code.contains("from \"/src/App.vue?type=template\""));
        assert!(code.contains("?type=custom&index=0&blockType=i18n"));
        assert!(!code.contains("blockType=docs"));
        assert!(code.trim_end().ends_with("export default __script"));
    }

    #[test]
    fn typescript_script_is_compiled() {
        let source = "<script lang=\"ts\">const n: number = 1\nexport default { n }</script>";
        let descriptor = sfc::parse(source).descriptor;
        let code = stage(Vec::new())
            .main_module("/A.vue", Path::new("/p/A.vue"), &descriptor)
            .unwrap();
        assert!(!code.contains(": number"));
        assert!(code.contains("const __script = { n }"));
    }
}
