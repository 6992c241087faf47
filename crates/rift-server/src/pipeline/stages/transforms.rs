//! Declarative response transforms and custom component blocks.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use rift_config::{CustomBlockTransform, TransformSpec};

use super::{TRANSFORMS, js_string, read_source};
use crate::content::ContentStore;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};
use crate::resolver::PathResolver;
use crate::sfc;

/// Placeholder in custom block templates.
const CONTENT_PLACEHOLDER: &str = "$content";

pub struct TransformsStage;

impl Stage for TransformsStage {
    fn name(&self) -> &str {
        TRANSFORMS
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        let transforms = ctx
            .config
            .transforms
            .iter()
            .enumerate()
            .map(|(index, spec)| CompiledTransform::compile(index, spec))
            .collect::<Result<Vec<_>, _>>()?;

        for (kind, block) in &ctx.config.custom_block_transforms {
            if !block.template.contains(CONTENT_PLACEHOLDER) {
                return Err(InstallError::InvalidTransform {
                    name: kind.clone(),
                    message: format!("custom block template must contain {CONTENT_PLACEHOLDER}"),
                });
            }
        }

        ctx.use_middleware(
            TRANSFORMS,
            Transforms {
                transforms,
                blocks: ctx.config.custom_block_transforms.clone(),
                store: Arc::clone(&ctx.store),
                resolver: Arc::clone(&ctx.resolver),
            },
        );
        Ok(())
    }
}

#[derive(Debug)]
struct CompiledTransform {
    name: String,
    test: Regex,
    replace: Vec<(Regex, String)>,
    prepend: Option<String>,
    append: Option<String>,
    content_type: Option<String>,
}

impl CompiledTransform {
    fn compile(index: usize, spec: &TransformSpec) -> Result<Self, InstallError> {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("transforms[{index}]"));
        let invalid = |e: regex::Error| InstallError::InvalidTransform {
            name: name.clone(),
            message: e.to_string(),
        };

        let test = Regex::new(&spec.test).map_err(invalid)?;
        let replace = spec
            .replace
            .iter()
            .map(|r| Ok((Regex::new(&r.from).map_err(invalid)?, r.to.clone())))
            .collect::<Result<Vec<_>, InstallError>>()?;

        Ok(Self {
            name,
            test,
            replace,
            prepend: spec.prepend.clone(),
            append: spec.append.clone(),
            content_type: spec.content_type.clone(),
        })
    }

    fn apply(&self, body: &str) -> String {
        let mut out = body.to_string();
        for (from, to) in &self.replace {
            out = from.replace_all(&out, to.as_str()).into_owned();
        }
        if let Some(prepend) = &self.prepend {
            out.insert_str(0, prepend);
        }
        if let Some(append) = &self.append {
            out.push_str(append);
        }
        out
    }
}

struct Transforms {
    transforms: Vec<CompiledTransform>,
    blocks: IndexMap<String, CustomBlockTransform>,
    store: Arc<ContentStore>,
    resolver: Arc<PathResolver>,
}

#[async_trait]
impl Middleware for Transforms {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if req.query_param("type") == Some("custom") {
            return self.custom_block(&req).await;
        }

        let path = req.path.clone();
        let mut res = next.run(req).await;
        if !res.is_ok() {
            return res;
        }

        for transform in self.transforms.iter().filter(|t| t.test.is_match(&path)) {
            let Some(body) = res.text_body() else {
                break;
            };
            tracing::trace!(transform = %transform.name, path = %path, "applying transform");
            let body = transform.apply(body);
            res.set_text(body);
            if let Some(content_type) = &transform.content_type {
                res.set_content_type(content_type);
            }
        }
        res
    }
}

impl Transforms {
    /// Serve `<file>?type=custom&index=N[&blockType=kind]` as a JS module.
    async fn custom_block(&self, req: &DevRequest) -> DevResponse {
        let (_, source) = match read_source(&self.store, &self.resolver, &req.path).await {
            Ok(found) => found,
            Err(res) => return res,
        };
        let Some(index) = req.query_param("index").and_then(|i| i.parse::<usize>().ok()) else {
            return DevResponse::not_found(&req.url());
        };

        let descriptor = sfc::parse(&source).descriptor;
        let Some(block) = descriptor.custom_blocks.get(index) else {
            return DevResponse::not_found(&req.url());
        };
        if req
            .query_param("blockType")
            .is_some_and(|kind| kind != block.kind)
        {
            return DevResponse::not_found(&req.url());
        }
        let Some(transform) = self.blocks.get(&block.kind) else {
            return DevResponse::not_found(&req.url());
        };

        DevResponse::js(
            transform
                .template
                .replace(CONTENT_PLACEHOLDER, &js_string(&block.content)),
        )
    }
}
