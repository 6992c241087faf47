//! Config module loading.
//!
//! A config module is loaded directly when it is plain data or CommonJS.
//! ES modules and TypeScript go through two explicit phases instead:
//! [`compile`] collects the entry and its relative imports into an
//! [`ExecutableUnit`], and [`execute`] evaluates that unit to a value.

mod compile;
mod direct;
mod eval;
mod execute;
mod externals;

use std::path::{Path, PathBuf};

pub use compile::{ExecutableUnit, ImportTarget, UnitModule, compile};
pub use direct::load_direct;
pub use execute::execute;
pub use externals::{ExternalModules, ExternalRegistry};

use oxc_span::SourceType;

use crate::error::{ConfigLoadError, Result};

/// Extensions tried, in order, when a relative specifier has none.
const RESOLVE_EXTENSIONS: &[&str] = &["ts", "js", "mjs", "cjs", "json"];

/// Whether `specifier` names a file relative to its importer.
pub(crate) fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Whether `path` is a data module that is loaded as-is rather than bundled.
pub(crate) fn is_data(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Whether `path` is TypeScript and must always be compiled.
pub fn is_typescript(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "ts" | "mts" | "cts"))
}

pub(crate) fn source_type_for(path: &Path) -> SourceType {
    if is_typescript(path) {
        SourceType::ts()
    } else {
        SourceType::mjs()
    }
}

/// Resolve a relative specifier against the importing file.
pub(crate) fn resolve_relative(importer: &Path, specifier: &str) -> Result<PathBuf> {
    let base = importer.parent().unwrap_or_else(|| Path::new("."));
    let candidate = path_clean::clean(base.join(specifier));

    if candidate.is_file() {
        return Ok(candidate);
    }

    for ext in RESOLVE_EXTENSIONS {
        let mut with_ext = candidate.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Ok(with_ext);
        }
    }

    for ext in RESOLVE_EXTENSIONS {
        let index = candidate.join(format!("index.{ext}"));
        if index.is_file() {
            return Ok(index);
        }
    }

    Err(ConfigLoadError::Unresolved {
        specifier: specifier.to_string(),
        importer: importer.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolves_extensionless_and_index_specifiers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shared.ts"), "").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/index.js"), "").unwrap();
        let importer = dir.path().join("rift.config.ts");

        assert_eq!(
            resolve_relative(&importer, "./shared").unwrap(),
            dir.path().join("shared.ts")
        );
        assert_eq!(
            resolve_relative(&importer, "./lib").unwrap(),
            dir.path().join("lib/index.js")
        );
        assert!(matches!(
            resolve_relative(&importer, "./missing"),
            Err(ConfigLoadError::Unresolved { .. })
        ));
    }

    #[test]
    fn classifies_specifiers() {
        assert!(is_relative("./a"));
        assert!(is_relative("../a"));
        assert!(!is_relative("vue"));
        assert!(is_data(Path::new("data.json")));
        assert!(is_typescript(Path::new("rift.config.ts")));
        assert!(!is_typescript(Path::new("rift.config.js")));
    }
}
