//! Middleware pipeline.
//!
//! Stages install middlewares onto a [`ServerContext`]. Installed middlewares
//! form an onion: each one receives the request and a [`Next`] handle for the
//! rest of the chain, and may answer directly or post-process what the inner
//! chain returns. The first middleware installed is the outermost.

pub mod stages;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rift_config::ResolvedConfig;

use crate::context::{InstalledMiddleware, ServerContext};
use crate::error::InstallError;
use crate::request::{DevRequest, DevResponse};

pub use stages::{
    AssetsStage, CompileStage, CssStage, HmrStage, HtmlRewriteStage, JsonStage,
    ModuleResolveStage, ModuleRewriteStage, ProxyStage, RequestLogStage, ServiceWorkerStage,
    SfcStage, StaticStage, TransformsStage,
};

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse;
}

/// The part of the chain inside the current middleware.
pub struct Next<'a> {
    chain: &'a [InstalledMiddleware],
}

impl Next<'_> {
    /// Run the inner chain. An exhausted chain answers 404.
    pub async fn run(self, req: DevRequest) -> DevResponse {
        match self.chain.split_first() {
            Some((head, rest)) => head.middleware.handle(req, Next { chain: rest }).await,
            None => DevResponse::not_found(&req.path),
        }
    }
}

/// Immutable snapshot of an installed chain.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<[InstalledMiddleware]>,
}

impl Pipeline {
    pub fn new(chain: Vec<InstalledMiddleware>) -> Self {
        Self {
            chain: chain.into(),
        }
    }

    pub async fn handle(&self, req: DevRequest) -> DevResponse {
        Next { chain: &self.chain }.run(req).await
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// A unit of server behavior installed once at startup.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Install middlewares or background tasks onto `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error when the stage cannot be set up from the resolved
    /// configuration. Startup aborts.
    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError>;
}

/// Stages that `configureServer` entries can name.
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistry {
    /// Registry holding the stages that ship with rift.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(RequestLogStage);
        registry
    }

    pub fn empty() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Register `stage` under its own name, replacing any previous stage of
    /// the same name.
    pub fn register(&mut self, stage: impl Stage + 'static) -> &mut Self {
        self.stages.insert(stage.name().to_string(), Arc::new(stage));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }
}

/// Assembles the fixed stage order around the user stages.
pub struct PipelineBuilder<'a> {
    config: &'a ResolvedConfig,
    registry: &'a StageRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(config: &'a ResolvedConfig, registry: &'a StageRegistry) -> Self {
        Self { config, registry }
    }

    /// Stages in install order, outermost first.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnknownStage`] for a `configureServer` entry
    /// the registry does not know.
    pub fn stages(&self) -> Result<Vec<Arc<dyn Stage>>, InstallError> {
        let mut stages: Vec<Arc<dyn Stage>> =
            vec![Arc::new(ModuleRewriteStage), Arc::new(HtmlRewriteStage)];

        for name in &self.config.configure_server {
            let stage = self
                .registry
                .get(name)
                .ok_or_else(|| InstallError::UnknownStage(name.clone()))?;
            stages.push(stage);
        }

        stages.push(Arc::new(ModuleResolveStage));
        stages.push(Arc::new(ProxyStage));
        stages.push(Arc::new(ServiceWorkerStage));
        stages.push(Arc::new(HmrStage));
        if !self.config.transforms.is_empty() || !self.config.custom_block_transforms.is_empty() {
            stages.push(Arc::new(TransformsStage));
        }
        stages.push(Arc::new(SfcStage));
        stages.push(Arc::new(CssStage));
        stages.push(Arc::new(CompileStage));
        stages.push(Arc::new(JsonStage));
        stages.push(Arc::new(AssetsStage));
        stages.push(Arc::new(StaticStage));

        Ok(stages)
    }

    /// Install every stage onto `ctx`.
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the build.
    pub fn install(&self, ctx: &ServerContext) -> Result<Vec<String>, InstallError> {
        let stages = self.stages()?;
        let mut names = Vec::with_capacity(stages.len());
        for stage in stages {
            stage.install(ctx)?;
            tracing::debug!(stage = stage.name(), "installed stage");
            names.push(stage.name().to_string());
        }
        Ok(names)
    }
}

/// Install the full stage chain for `config` onto `ctx`.
///
/// # Returns
///
/// Names of the installed stages, outermost first
///
/// # Errors
///
/// Returns the first [`InstallError`]; the server must not start.
pub fn build(
    ctx: &ServerContext,
    config: &ResolvedConfig,
    registry: &StageRegistry,
) -> Result<Vec<String>, InstallError> {
    PipelineBuilder::new(config, registry).install(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
            let mut res = next.run(req).await;
            let body = res.text_body().unwrap_or_default().to_string();
            res.set_text(format!("{}{}", self.0, body));
            res
        }
    }

    struct Answer;

    #[async_trait]
    impl Middleware for Answer {
        async fn handle(&self, _req: DevRequest, _next: Next<'_>) -> DevResponse {
            DevResponse::js("!")
        }
    }

    fn installed(stage: &str, middleware: impl Middleware + 'static) -> InstalledMiddleware {
        InstalledMiddleware {
            stage: stage.to_string(),
            middleware: Arc::new(middleware),
        }
    }

    #[tokio::test]
    async fn outer_middlewares_post_process_last() {
        let pipeline = Pipeline::new(vec![
            installed("outer", Tag("a")),
            installed("inner", Tag("b")),
            installed("answer", Answer),
        ]);
        let res = pipeline.handle(DevRequest::get("/")).await;
        assert_eq!(res.text_body(), Some("ab!"));
    }

    #[tokio::test]
    async fn exhausted_chain_is_not_found() {
        let res = Pipeline::new(Vec::new()).handle(DevRequest::get("/x")).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn stage_order_places_user_stages_after_rewrites() {
        let config = ResolvedConfig {
            configure_server: vec!["request-log".to_string()],
            ..Default::default()
        };
        let registry = StageRegistry::new();
        let names: Vec<String> = PipelineBuilder::new(&config, &registry)
            .stages()
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "module-rewrite",
                "html-rewrite",
                "request-log",
                "module-resolve",
                "proxy",
                "service-worker",
                "hmr",
                "sfc",
                "css",
                "compile",
                "json",
                "assets",
                "static",
            ]
        );
    }

    #[test]
    fn transforms_stage_only_with_transforms() {
        let config = ResolvedConfig {
            transforms: vec![rift_config::TransformSpec {
                test: r"\.js$".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let registry = StageRegistry::new();
        let stages = PipelineBuilder::new(&config, &registry).stages().unwrap();
        assert!(stages.iter().any(|s| s.name() == "transforms"));
    }

    #[test]
    fn unknown_user_stage_fails() {
        let config = ResolvedConfig {
            configure_server: vec!["nope".to_string()],
            ..Default::default()
        };
        let registry = StageRegistry::new();
        let err = PipelineBuilder::new(&config, &registry)
            .stages()
            .err()
            .unwrap();
        assert!(matches!(err, InstallError::UnknownStage(name) if name == "nope"));
    }
}
