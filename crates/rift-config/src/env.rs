//! Environment file loading.
//!
//! Four files are probed under the project root, in increasing precedence:
//! `.env`, `.env.local`, `.env.<mode>`, `.env.<mode>.local`. Later files
//! override earlier ones per key.
//!
//! Values go through dotenvy's substitution: `$VAR` and `${VAR}` expand from
//! the process environment, then from keys defined earlier in the same file.
//! Single-quoted values stay literal.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::{ConfigLoadError, Result};

/// Env file names for `mode`, lowest precedence first.
pub fn env_file_names(mode: &str) -> [String; 4] {
    [
        ".env".to_string(),
        ".env.local".to_string(),
        format!(".env.{mode}"),
        format!(".env.{mode}.local"),
    ]
}

/// Load the environment map for `mode` from env files under `root`.
///
/// # Errors
///
/// Returns `ConfigLoadError::Env` if any present file fails to parse.
pub fn load_env(mode: &str, root: &Path) -> Result<IndexMap<String, String>> {
    tracing::debug!(target: "rift::config", mode, "loading env files");

    let mut env = IndexMap::new();
    for name in env_file_names(mode) {
        let path = root.join(&name);
        if !path.is_file() {
            continue;
        }

        let entries = dotenvy::from_path_iter(&path).map_err(|e| ConfigLoadError::Env {
            path: path.clone(),
            message: e.to_string(),
        })?;

        for entry in entries {
            let (key, value) = entry.map_err(|e| ConfigLoadError::Env {
                path: path.clone(),
                message: e.to_string(),
            })?;
            env.insert(key, value);
        }
    }

    tracing::trace!(target: "rift::config", ?env, "env resolved");
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn mode_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "A=1\n").unwrap();
        fs::write(dir.path().join(".env.development"), "A=2\nB=3\n").unwrap();

        let env = load_env("development", dir.path()).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env["A"], "2");
        assert_eq!(env["B"], "3");
    }

    #[test]
    fn local_files_take_precedence_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "KEY=base\n").unwrap();
        fs::write(dir.path().join(".env.local"), "KEY=local\n").unwrap();
        fs::write(dir.path().join(".env.production"), "KEY=mode\n").unwrap();
        fs::write(dir.path().join(".env.production.local"), "KEY=mode-local\n").unwrap();

        assert_eq!(load_env("production", dir.path()).unwrap()["KEY"], "mode-local");
        assert_eq!(load_env("development", dir.path()).unwrap()["KEY"], "local");
    }

    #[test]
    fn references_expand_unless_single_quoted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".env"),
            "RIFT_EXPANSION_ORIGIN=example.test\nURL=https://${RIFT_EXPANSION_ORIGIN}/api\nRAW='${RIFT_EXPANSION_ORIGIN}'\n",
        )
        .unwrap();

        let env = load_env("development", dir.path()).unwrap();
        assert_eq!(env["URL"], "https://example.test/api");
        assert_eq!(env["RAW"], "${RIFT_EXPANSION_ORIGIN}");
    }

    #[test]
    fn missing_files_yield_empty_map() {
        let dir = TempDir::new().unwrap();
        assert!(load_env("development", dir.path()).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "NOT VALID LINE WITHOUT EQUALS\n").unwrap();

        let err = load_env("development", dir.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Env { .. }));
    }
}
