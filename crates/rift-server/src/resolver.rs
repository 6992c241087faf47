//! Mapping between public request paths and files on disk.

use std::path::{Path, PathBuf};

use rift_config::{ResolvedConfig, ResolverSpec};

/// Extensions tried for extensionless imports, in order.
pub const IMPLICIT_EXTENSIONS: &[&str] = &["js", "ts", "jsx", "tsx", "vue", "mjs"];

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    resolvers: Vec<ResolverSpec>,
    alias: Vec<(String, String)>,
}

impl PathResolver {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            root: config.root.clone(),
            resolvers: config.resolvers.clone(),
            alias: config
                .alias
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a public path. Paths escaping their base directory
    /// resolve to `None`.
    pub fn request_to_file(&self, public_path: &str) -> Option<PathBuf> {
        for spec in &self.resolvers {
            if let Some(rest) = public_path.strip_prefix(spec.public_path.as_str()) {
                let dir = if spec.dir.is_absolute() {
                    spec.dir.clone()
                } else {
                    self.root.join(&spec.dir)
                };
                return contained(&dir, rest);
            }
        }
        contained(&self.root, public_path)
    }

    /// Public path serving `file`.
    pub fn file_to_request(&self, file: &Path) -> Option<String> {
        for spec in &self.resolvers {
            let dir = if spec.dir.is_absolute() {
                spec.dir.clone()
            } else {
                self.root.join(&spec.dir)
            };
            if let Ok(rest) = file.strip_prefix(&dir) {
                let prefix = spec.public_path.trim_end_matches('/');
                return Some(format!("{prefix}/{}", to_slash(rest)));
            }
        }
        let rest = file.strip_prefix(&self.root).ok()?;
        Some(format!("/{}", to_slash(rest)))
    }

    /// Apply the alias table to an import specifier.
    ///
    /// Keys written as `/dir/` replace a path prefix; other keys match the
    /// whole specifier or a `key/` prefix.
    pub fn alias(&self, specifier: &str) -> Option<String> {
        for (key, target) in &self.alias {
            if key.starts_with('/') && key.ends_with('/') {
                if let Some(rest) = specifier.strip_prefix(key.as_str()) {
                    return Some(format!("{target}{rest}"));
                }
            } else if specifier == key {
                return Some(target.clone());
            } else if let Some(rest) = specifier
                .strip_prefix(key.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return Some(format!("{}/{rest}", target.trim_end_matches('/')));
            }
        }
        None
    }

    /// Add a missing extension to a public path by probing disk.
    pub fn with_implicit_extension(&self, public_path: &str) -> String {
        let Some(file) = self.request_to_file(public_path) else {
            return public_path.to_string();
        };
        if file.is_file() {
            return public_path.to_string();
        }
        for ext in IMPLICIT_EXTENSIONS {
            let mut candidate = file.clone().into_os_string();
            candidate.push(format!(".{ext}"));
            if Path::new(&candidate).is_file() {
                return format!("{public_path}.{ext}");
            }
        }
        for ext in IMPLICIT_EXTENSIONS {
            if file.join(format!("index.{ext}")).is_file() {
                return format!("{}/index.{ext}", public_path.trim_end_matches('/'));
            }
        }
        public_path.to_string()
    }
}

fn contained(base: &Path, rest: &str) -> Option<PathBuf> {
    let file = path_clean::clean(base.join(rest.trim_start_matches('/')));
    file.starts_with(base).then_some(file)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
