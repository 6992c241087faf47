//! Project manifest (`package.json`) checks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigLoadError, Result};

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: HashMap<String, String>,
}

/// The parts of a project manifest the dev server cares about.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    pub path: PathBuf,
    /// The `scripts.dev` command, if declared.
    pub dev_script: Option<String>,
}

impl ProjectManifest {
    /// Load `package.json` from `root`. `Ok(None)` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError::Manifest` if the file is not valid JSON.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let mut package: PackageJson =
            serde_json::from_str(&content).map_err(|e| ConfigLoadError::Manifest {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(Some(Self {
            dev_script: package.scripts.remove("dev"),
            path,
        }))
    }

    /// Whether the dev command runs `tool`: exactly `tool`, or `tool` followed
    /// by arguments.
    pub fn dev_script_runs(&self, tool: &str) -> bool {
        self.dev_script.as_deref().is_some_and(|script| {
            let script = script.trim();
            script == tool
                || script
                    .strip_prefix(tool)
                    .is_some_and(|rest| rest.starts_with(' '))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(script: Option<&str>) -> ProjectManifest {
        ProjectManifest {
            path: PathBuf::from(MANIFEST_FILE),
            dev_script: script.map(str::to_string),
        }
    }

    #[test]
    fn recognizes_dev_script() {
        assert!(manifest(Some("rift")).dev_script_runs("rift"));
        assert!(manifest(Some("rift dev --port 4000")).dev_script_runs("rift"));
        assert!(!manifest(Some("rifter")).dev_script_runs("rift"));
        assert!(!manifest(Some("vite")).dev_script_runs("rift"));
        assert!(!manifest(None).dev_script_runs("rift"));
    }

    #[test]
    fn loads_scripts_from_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{ "name": "app", "scripts": { "dev": "rift", "build": "x" } }"#,
        )
        .unwrap();

        let manifest = ProjectManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.dev_script.as_deref(), Some("rift"));
    }

    #[test]
    fn missing_manifest_is_none_and_invalid_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectManifest::load(dir.path()).unwrap().is_none());

        fs::write(dir.path().join(MANIFEST_FILE), "{ nope").unwrap();
        assert!(matches!(
            ProjectManifest::load(dir.path()),
            Err(ConfigLoadError::Manifest { .. })
        ));
    }
}
