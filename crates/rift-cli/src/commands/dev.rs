//! Development server command.
//!
//! 1. Resolve the project root and check `package.json`
//! 2. Resolve the config module for the mode
//! 3. Layer listen settings
//! 4. Build the pipeline and serve
//! 5. Optionally read editor buffers from stdin
//! 6. Shut down on Ctrl+C

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rift_config::manifest::MANIFEST_FILE;
use rift_config::{ProjectManifest, ResolvedConfig};
use rift_server::{DevServer, EditorBufferBridge, StageRegistry};
use tokio::signal;
use tokio::task::JoinHandle;

use crate::cli::DevArgs;
use crate::error::{CliError, Result, ResultExt};
use crate::settings::ServeSettings;
use crate::ui;

/// Name the dev script must run.
const TOOL: &str = "rift";

/// Execute the dev command.
///
/// # Errors
///
/// Returns errors for a missing root, a manifest that does not run rift
/// (without `--force`), config load failures, invalid settings, stage
/// install failures and bind failures.
pub async fn execute(args: DevArgs) -> Result<()> {
    let root = project_root(args.root.as_deref())?;
    check_manifest(&root, args.force)?;

    let config = load_config(&root, &args)?;
    ui::info(&format!("Project root: {}", config.root.display()));
    if let Some(path) = &config.config_path {
        ui::info(&format!("Config: {}", path.display()));
    }

    let settings = ServeSettings::load(&args, &config.server)?;
    let addr = settings.socket_addr().await?;

    let server = Arc::new(DevServer::new(config, &StageRegistry::new())?);
    tracing::debug!(stages = ?server.stages(), "pipeline ready");

    let mut serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(addr).await })
    };

    let local_addr = wait_until_listening(&server, &mut serving).await?;
    let url = settings.url(local_addr.port());
    ui::success(&format!("Dev server running at {url}"));

    if settings.open {
        open_browser(&url);
    }

    let bridge = args.editor_stdio.then(|| {
        let bridge = EditorBufferBridge::new(server.context());
        tokio::spawn(async move {
            if let Err(e) = bridge.serve_stdio().await {
                tracing::warn!(target: "rift::bridge", error = %e, "editor input failed");
            }
        })
    });

    ui::info("Press Ctrl+C to stop");

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down development server...");
            server.shutdown();
            serving.await
        }
        result = &mut serving => {
            ui::warning("Server stopped unexpectedly");
            result
        }
    };

    if let Some(bridge) = bridge {
        bridge.abort();
    }
    server.shutdown();

    match result {
        Ok(Ok(())) => {
            ui::success("Development server stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(CliError::Custom(format!("server task failed: {e}"))),
    }
}

/// Canonical project root: `root`, or the current directory.
fn project_root(root: Option<&Path>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let root = std::fs::canonicalize(&root).with_path(&root)?;
    if !root.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "project root is not a directory: {}",
            root.display()
        )));
    }
    Ok(root)
}

/// Refuse to start unless `package.json`'s dev script runs rift.
///
/// `force` downgrades the refusal to a warning.
fn check_manifest(root: &Path, force: bool) -> Result<()> {
    let manifest = ProjectManifest::load(root)?;
    if manifest
        .as_ref()
        .is_some_and(|manifest| manifest.dev_script_runs(TOOL))
    {
        return Ok(());
    }

    let (path, dev_script) = match manifest {
        Some(manifest) => (manifest.path, manifest.dev_script),
        None => (root.join(MANIFEST_FILE), None),
    };
    let err = CliError::Manifest { path, dev_script };

    if force {
        let message = err.to_string();
        let first_line = message.lines().next().unwrap_or_default();
        ui::warning(&format!("{first_line}; continuing because of --force"));
        return Ok(());
    }
    Err(err)
}

/// Resolve the config module. Failures are logged on `rift::config` before
/// they end the process.
fn load_config(root: &Path, args: &DevArgs) -> Result<ResolvedConfig> {
    // --config is relative to where rift was started, not to the root.
    let explicit = match &args.config {
        Some(path) => Some(std::env::current_dir()?.join(path)),
        None => None,
    };

    rift_config::resolve(root, &args.mode, explicit.as_deref()).map_err(|e| {
        tracing::error!(target: "rift::config", error = %e, "failed to load config");
        e.into()
    })
}

/// Wait for the listener to bind, or for `serving` to fail first.
async fn wait_until_listening(
    server: &DevServer,
    serving: &mut JoinHandle<rift_server::Result<()>>,
) -> Result<SocketAddr> {
    loop {
        if let Some(addr) = server.local_addr() {
            return Ok(addr);
        }
        tokio::select! {
            result = &mut *serving => {
                return Err(match result {
                    Ok(Err(e)) => e.into(),
                    Ok(Ok(())) => CliError::Custom("server stopped before listening".to_string()),
                    Err(e) => CliError::Custom(format!("server task failed: {e}")),
                });
            }
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
    }
}

/// Open `url` in the default browser.
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {url}")),
        Err(e) => ui::warning(&format!("Failed to open browser: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(dev_script: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        let scripts = match dev_script {
            Some(script) => format!(r#"{{"scripts":{{"dev":"{script}"}}}}"#),
            None => "{}".to_string(),
        };
        fs::write(dir.path().join("package.json"), scripts).unwrap();
        dir
    }

    #[test]
    fn test_manifest_running_rift_passes() {
        let dir = project(Some("rift dev --open"));
        assert!(check_manifest(dir.path(), false).is_ok());
    }

    #[test]
    fn test_manifest_running_other_tool_fails() {
        let dir = project(Some("rifter"));
        let err = check_manifest(dir.path(), false).unwrap_err();
        assert!(matches!(err, CliError::Manifest { dev_script: Some(_), .. }));
    }

    #[test]
    fn test_missing_manifest_fails_unless_forced() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            check_manifest(dir.path(), false).unwrap_err(),
            CliError::Manifest { dev_script: None, .. }
        ));
        assert!(check_manifest(dir.path(), true).is_ok());
    }

    #[test]
    fn test_project_root_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            project_root(Some(missing.as_path())).unwrap_err(),
            CliError::FileNotFound(_)
        ));
    }

    #[test]
    fn test_project_root_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            project_root(Some(file.as_path())).unwrap_err(),
            CliError::InvalidArgument(_)
        ));
    }
}
