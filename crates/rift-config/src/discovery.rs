//! File-based config discovery.
//!
//! Finds the rift config module for a project root.

use std::path::{Path, PathBuf};

use crate::error::{ConfigLoadError, Result};

/// Default config file names, probed in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "rift.config.js",
    "rift.config.mjs",
    "rift.config.ts",
    "rift.config.json",
    "rift.config.toml",
];

/// Searches a project root for its config module.
///
/// # Example
///
/// ```no_run
/// use rift_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let path = discovery.find(None).unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Locate the config module.
    ///
    /// An explicit path is taken relative to the root and must exist. Without
    /// one, [`DEFAULT_CONFIG_FILES`] are probed and `None` means the project
    /// has no config module.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError::NotFound` if an explicit path does not exist.
    pub fn find(&self, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(explicit) = explicit {
            let path = path_clean::clean(self.root.join(explicit));
            if !path.is_file() {
                return Err(ConfigLoadError::NotFound(path));
            }
            return Ok(Some(path));
        }

        let found = DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file());

        match &found {
            Some(path) => {
                tracing::debug!(target: "rift::config", path = %path.display(), "found config module")
            }
            None => tracing::debug!(
                target: "rift::config",
                root = %self.root.display(),
                "no config module found"
            ),
        }

        Ok(found)
    }
}
