//! TypeScript and JSX compilation with the embedded oxc transformer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};
use rift_config::{JsxOption, ResolvedConfig};
use serde_json::Value;

use super::{COMPILE, public_extension};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse, JS};

/// How JSX is lowered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JsxMode {
    /// `react/jsx-runtime` imports.
    #[default]
    Automatic,
    Classic {
        factory: String,
        fragment: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub jsx: JsxMode,
}

impl CompileOptions {
    /// Options from the `jsx` setting, overridden by the TypeScript-style
    /// `jsxFactory` / `jsxFragmentFactory` compiler options.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut jsx = match &config.jsx {
            None => JsxMode::Automatic,
            Some(JsxOption::Preset(preset)) => preset_mode(preset),
            Some(JsxOption::Custom { factory, fragment }) => JsxMode::Classic {
                factory: factory.clone().unwrap_or_else(|| "h".to_string()),
                fragment: fragment.clone().unwrap_or_else(|| "Fragment".to_string()),
            },
        };

        let factory = config.compiler_options.get("jsxFactory").and_then(Value::as_str);
        let fragment = config
            .compiler_options
            .get("jsxFragmentFactory")
            .and_then(Value::as_str);
        if factory.is_some() || fragment.is_some() {
            let (current_factory, current_fragment) = match &jsx {
                JsxMode::Classic { factory, fragment } => (factory.clone(), fragment.clone()),
                JsxMode::Automatic => (
                    "React.createElement".to_string(),
                    "React.Fragment".to_string(),
                ),
            };
            jsx = JsxMode::Classic {
                factory: factory.map_or(current_factory, str::to_string),
                fragment: fragment.map_or(current_fragment, str::to_string),
            };
        }

        Self { jsx }
    }

    fn transform_options(&self) -> TransformOptions {
        let jsx = match &self.jsx {
            JsxMode::Automatic => JsxOptions::default(),
            JsxMode::Classic { factory, fragment } => JsxOptions {
                runtime: JsxRuntime::Classic,
                pragma: Some(factory.clone()),
                pragma_frag: Some(fragment.clone()),
                ..JsxOptions::default()
            },
        };
        TransformOptions {
            jsx,
            ..TransformOptions::default()
        }
    }
}

fn preset_mode(preset: &str) -> JsxMode {
    let (factory, fragment) = match preset {
        "react" => ("React.createElement", "React.Fragment"),
        "preact" | "vue" => ("h", "Fragment"),
        _ => return JsxMode::Automatic,
    };
    JsxMode::Classic {
        factory: factory.to_string(),
        fragment: fragment.to_string(),
    }
}

/// Extensions compiled to JavaScript.
fn is_compiled_extension(ext: &str) -> bool {
    matches!(ext, "ts" | "mts" | "cts" | "tsx" | "jsx")
}

/// Compile TypeScript or JSX `source` to JavaScript. The language comes
/// from the extension of `path`.
///
/// # Errors
///
/// Returns the joined diagnostics when the source fails to parse or
/// transform.
pub fn transpile(source: &str, path: &Path, options: &CompileOptions) -> Result<String, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::ts());

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(join_errors(&parsed.errors));
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let transformed = Transformer::new(&allocator, path, &options.transform_options())
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(join_errors(&transformed.errors));
    }

    Ok(Codegen::new().build(&program).code)
}

fn join_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    if errors.is_empty() {
        return "unrecoverable syntax error".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct CompileStage;

impl Stage for CompileStage {
    fn name(&self) -> &str {
        COMPILE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            COMPILE,
            Compile {
                options: Arc::new(CompileOptions::from_config(&ctx.config)),
            },
        );
        Ok(())
    }
}

struct Compile {
    options: Arc<CompileOptions>,
}

#[async_trait]
impl Middleware for Compile {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let compiled = public_extension(&req.path).is_some_and(is_compiled_extension);
        let path = req.path.clone();
        let mut res = next.run(req).await;
        if !compiled || !res.is_ok() {
            return res;
        }
        let Some(source) = res.text_body() else {
            return res;
        };

        match transpile(source, Path::new(&path), &self.options) {
            Ok(code) => {
                res.set_text(code);
                res.set_content_type(JS);
                res
            }
            Err(message) => {
                tracing::warn!(path = %path, "compile failed:\n{message}");
                DevResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to compile {path}:\n{message}"),
                )
            }
        }
    }
}
