//! Serves `/@modules/<id>` from the project's dependency directory.
//!
//! The id is mapped onto a file under `node_modules` and the request is
//! handed to the inner stages under that path, so package files get the same
//! css, json and compile handling as project files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::http::HeaderValue;
use serde::Deserialize;

use super::MODULE_RESOLVE;
use super::module_rewrite::{IMPORTER_HEADER, MODULES_PREFIX};
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};

const DEPENDENCY_DIR: &str = "node_modules";
const ENTRY_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts"];

pub struct ModuleResolveStage;

impl Stage for ModuleResolveStage {
    fn name(&self) -> &str {
        MODULE_RESOLVE
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        ctx.use_middleware(
            MODULE_RESOLVE,
            ModuleResolve {
                root: ctx.root.clone(),
            },
        );
        Ok(())
    }
}

struct ModuleResolve {
    root: PathBuf,
}

#[async_trait]
impl Middleware for ModuleResolve {
    async fn handle(&self, mut req: DevRequest, next: Next<'_>) -> DevResponse {
        let Some(id) = req.path.strip_prefix(MODULES_PREFIX) else {
            return next.run(req).await;
        };

        let deps = self.root.join(DEPENDENCY_DIR);
        let Some(file) = resolve_module(&deps, id).await else {
            tracing::debug!(id, "unresolved module");
            return DevResponse::not_found(&req.path);
        };
        let Ok(relative) = file.strip_prefix(&self.root) else {
            return DevResponse::not_found(&req.path);
        };

        let internal = format!(
            "/{}",
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        );
        tracing::trace!(id, path = %internal, "module resolved");

        req.path = internal.clone();
        let mut res = next.run(req).await;
        if res.is_ok() {
            if let Ok(value) = HeaderValue::from_str(&internal) {
                res.headers.insert(IMPORTER_HEADER, value);
            }
        }
        res
    }
}

/// Split a bare id into package name and optional subpath.
///
/// `@scope/pkg/a.js` gives `("@scope/pkg", Some("a.js"))`.
pub(crate) fn split_package_id(id: &str) -> (&str, Option<&str>) {
    let name_segments = if id.starts_with('@') { 2 } else { 1 };
    let mut split_at = None;
    for (seen, (index, _)) in id.match_indices('/').enumerate() {
        if seen + 1 == name_segments {
            split_at = Some(index);
            break;
        }
    }
    match split_at {
        Some(index) => {
            let subpath = &id[index + 1..];
            (&id[..index], (!subpath.is_empty()).then_some(subpath))
        }
        None => (id, None),
    }
}

async fn resolve_module(deps: &Path, id: &str) -> Option<PathBuf> {
    let (name, subpath) = split_package_id(id);
    if name.split('/').any(|segment| segment == ".." || segment == ".") {
        return None;
    }
    let package_dir = deps.join(name);
    let file = match subpath {
        Some(subpath) => probe_file(&package_dir.join(subpath)).await?,
        None => package_dir.join(resolve_package_entry(&package_dir).await?),
    };
    let file = path_clean::clean(file);
    file.starts_with(&package_dir).then_some(file)
}

#[derive(Deserialize)]
struct PackageEntry {
    module: Option<String>,
    main: Option<String>,
}

/// Entry file of a package relative to its directory: `module`, else
/// `main`, else `index.js`.
pub async fn resolve_package_entry(package_dir: &Path) -> Option<String> {
    let manifest = tokio::fs::read_to_string(package_dir.join("package.json"))
        .await
        .ok()?;
    let entry: PackageEntry = serde_json::from_str(&manifest).ok()?;
    let declared = entry.module.or(entry.main);
    if let Some(declared) = declared {
        let declared = declared.trim_start_matches("./").to_string();
        if let Some(file) = probe_file(&package_dir.join(&declared)).await {
            return file
                .strip_prefix(package_dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"));
        }
        return Some(declared);
    }
    Some("index.js".to_string())
}

/// `path` itself, `path` plus an entry extension, or `path/index.js`.
async fn probe_file(path: &Path) -> Option<PathBuf> {
    if is_file(path).await {
        return Some(path.to_path_buf());
    }
    for ext in ENTRY_EXTENSIONS {
        let mut candidate = path.to_path_buf().into_os_string();
        candidate.push(format!(".{ext}"));
        let candidate = PathBuf::from(candidate);
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    let index = path.join("index.js");
    is_file(&index).await.then_some(index)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}
