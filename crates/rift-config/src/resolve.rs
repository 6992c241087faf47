//! Config resolution: discovery, loading, root normalization, plugin merge
//! and environment loading.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::config::{ResolvedConfig, UserConfig};
use crate::discovery::ConfigDiscovery;
use crate::env::load_env;
use crate::error::Result;
use crate::module::{ExternalModules, ExternalRegistry, compile, execute, is_typescript, load_direct};

/// Resolve the config for `root` and `mode` with no external modules.
///
/// See [`ConfigResolver::resolve`].
pub fn resolve(root: &Path, mode: &str, explicit_path: Option<&Path>) -> Result<ResolvedConfig> {
    ConfigResolver::new().resolve(root, mode, explicit_path)
}

/// Produces one immutable [`ResolvedConfig`] per server start.
#[derive(Clone)]
pub struct ConfigResolver {
    externals: Arc<dyn ExternalModules>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            externals: Arc::new(ExternalRegistry::new()),
        }
    }

    /// Use `externals` for bare specifiers imported by config modules.
    pub fn with_externals(externals: impl ExternalModules + 'static) -> Self {
        Self {
            externals: Arc::new(externals),
        }
    }

    /// Resolve the config for a project.
    ///
    /// Without a config module the result carries only root, mode and the
    /// environment map.
    ///
    /// # Errors
    ///
    /// Any discovery, load, compile, evaluation or env-file failure. None of
    /// them are retried.
    pub fn resolve(
        &self,
        root: &Path,
        mode: &str,
        explicit_path: Option<&Path>,
    ) -> Result<ResolvedConfig> {
        let start = Instant::now();
        let root = absolutize(root)?;

        let Some(config_path) = ConfigDiscovery::new(&root).find(explicit_path)? else {
            let env = load_env(mode, &root)?;
            return Ok(ResolvedConfig::minimal(root, mode, env));
        };

        let value = self.load_module(&config_path)?;
        let mut user = UserConfig::from_value(value)?;

        let config_dir = config_path.parent().unwrap_or(root.as_path()).to_path_buf();
        let resolved_root = match user.root.take() {
            Some(declared) => path_clean::clean(config_dir.join(declared)),
            None => root,
        };

        user.apply_plugins();
        let env = load_env(mode, &resolved_root)?;

        tracing::debug!(
            target: "rift::config",
            path = %config_path.display(),
            root = %resolved_root.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "config resolved"
        );

        Ok(ResolvedConfig::from_user(
            user,
            resolved_root,
            mode,
            env,
            config_path,
        ))
    }

    /// Load a config module, compiling it when the direct path cannot.
    pub fn load_module(&self, path: &Path) -> Result<Value> {
        if is_typescript(path) {
            return self.compile_and_execute(path);
        }

        match load_direct(path, self.externals.as_ref()) {
            Ok(value) => Ok(value),
            Err(err) if err.is_unsupported_syntax() => {
                tracing::debug!(
                    target: "rift::config",
                    path = %path.display(),
                    reason = %err,
                    "direct load failed, compiling config module"
                );
                self.compile_and_execute(path)
            }
            Err(err) => Err(err),
        }
    }

    fn compile_and_execute(&self, path: &Path) -> Result<Value> {
        let unit = compile(path)?;
        execute(&unit, self.externals.as_ref())
    }
}

fn absolutize(root: &Path) -> Result<PathBuf> {
    if root.is_absolute() {
        return Ok(path_clean::clean(root));
    }
    Ok(path_clean::clean(std::env::current_dir()?.join(root)))
}
