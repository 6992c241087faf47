//! Compile phase: collect a config module and its relative imports into a
//! single executable unit.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::ModuleDeclaration;
use oxc_parser::{Parser, ParserReturn};

use super::{is_data, is_relative, resolve_relative, source_type_for};
use crate::error::{ConfigLoadError, Result};

/// Where an import specifier points after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A relative source module included in the unit.
    Bundled(PathBuf),
    /// A data file, loaded as-is at execution time.
    Data(PathBuf),
    /// Left to the external module registry.
    External(String),
}

/// One source module within an executable unit.
#[derive(Debug, Clone)]
pub struct UnitModule {
    pub path: PathBuf,
    pub source: String,
    /// Specifier → target, in import order.
    pub imports: IndexMap<String, ImportTarget>,
}

/// The compiled form of a config module.
///
/// Modules are stored dependencies first, so executing them in order always
/// finds an import's exports already evaluated.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    pub entry: PathBuf,
    pub modules: Vec<UnitModule>,
    /// Every external specifier referenced by the unit, deduplicated.
    pub externals: Vec<String>,
}

impl ExecutableUnit {
    pub fn module(&self, path: &Path) -> Option<&UnitModule> {
        self.modules.iter().find(|m| m.path == path)
    }
}

/// Compile the config module at `entry`.
///
/// # Errors
///
/// Returns `ConfigLoadError::Compile` on syntax errors or import cycles and
/// `ConfigLoadError::Unresolved` for relative imports with no matching file.
pub fn compile(entry: &Path) -> Result<ExecutableUnit> {
    let mut compiler = UnitCompiler::default();
    compiler.visit(entry)?;

    tracing::debug!(
        target: "rift::config",
        entry = %entry.display(),
        modules = compiler.modules.len(),
        externals = compiler.externals.len(),
        "compiled config module"
    );

    Ok(ExecutableUnit {
        entry: entry.to_path_buf(),
        modules: compiler.modules,
        externals: compiler.externals,
    })
}

#[derive(Default)]
struct UnitCompiler {
    modules: Vec<UnitModule>,
    externals: Vec<String>,
    visiting: Vec<PathBuf>,
    done: HashSet<PathBuf>,
}

impl UnitCompiler {
    fn visit(&mut self, path: &Path) -> Result<()> {
        if self.done.contains(path) {
            return Ok(());
        }
        if self.visiting.iter().any(|p| p == path) {
            let chain = self
                .visiting
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigLoadError::Compile {
                path: path.to_path_buf(),
                message: format!("circular import: {chain}"),
            });
        }

        self.visiting.push(path.to_path_buf());

        let source = fs::read_to_string(path)?;
        let specifiers = scan_imports(path, &source)?;

        let mut imports = IndexMap::new();
        for specifier in specifiers {
            if imports.contains_key(&specifier) {
                continue;
            }
            let target = if is_relative(&specifier) {
                let resolved = resolve_relative(path, &specifier)?;
                if is_data(&resolved) {
                    ImportTarget::Data(resolved)
                } else {
                    self.visit(&resolved)?;
                    ImportTarget::Bundled(resolved)
                }
            } else {
                if !self.externals.contains(&specifier) {
                    self.externals.push(specifier.clone());
                }
                ImportTarget::External(specifier.clone())
            };
            imports.insert(specifier, target);
        }

        self.visiting.pop();
        self.done.insert(path.to_path_buf());
        self.modules.push(UnitModule {
            path: path.to_path_buf(),
            source,
            imports,
        });
        Ok(())
    }
}

/// Value-level import and re-export specifiers of a module, in source order.
fn scan_imports(path: &Path, source: &str) -> Result<Vec<String>> {
    let allocator = Allocator::default();
    let ParserReturn {
        program, errors, ..
    } = Parser::new(&allocator, source, source_type_for(path)).parse();

    if !errors.is_empty() {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigLoadError::Compile {
            path: path.to_path_buf(),
            message,
        });
    }

    let mut specifiers = Vec::new();
    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        match decl {
            ModuleDeclaration::ImportDeclaration(import) if !import.import_kind.is_type() => {
                specifiers.push(import.source.value.to_string());
            }
            ModuleDeclaration::ExportNamedDeclaration(export) if !export.export_kind.is_type() => {
                if let Some(source) = &export.source {
                    specifiers.push(source.value.to_string());
                }
            }
            ModuleDeclaration::ExportAllDeclaration(export) => {
                specifiers.push(export.source.value.to_string());
            }
            _ => {}
        }
    }
    Ok(specifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn orders_dependencies_first_and_marks_externals() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.ts"), "export const port = 3000;").unwrap();
        fs::write(dir.path().join("data.json"), "{}").unwrap();
        let entry = dir.path().join("rift.config.ts");
        fs::write(
            &entry,
            r#"
            import type { Config } from "rift";
            import { port } from "./base";
            import data from "./data.json";
            import preset from "rift-preset";
            export default { port } as Config;
            "#,
        )
        .unwrap();

        let unit = compile(&entry).unwrap();

        let order: Vec<_> = unit.modules.iter().map(|m| m.path.clone()).collect();
        assert_eq!(order, vec![dir.path().join("base.ts"), entry.clone()]);
        assert_eq!(unit.externals, vec!["rift-preset".to_string()]);

        let imports = &unit.module(&entry).unwrap().imports;
        assert_eq!(
            imports["./data.json"],
            ImportTarget::Data(dir.path().join("data.json"))
        );
        assert!(!imports.contains_key("rift"));
    }

    #[test]
    fn shared_dependency_is_compiled_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shared.js"), "export const a = 1;").unwrap();
        fs::write(dir.path().join("left.js"), "export * from './shared.js';").unwrap();
        fs::write(dir.path().join("right.js"), "export { a } from './shared.js';").unwrap();
        let entry = dir.path().join("rift.config.js");
        fs::write(
            &entry,
            "import './left.js';\nimport './right.js';\nexport default {};",
        )
        .unwrap();

        let unit = compile(&entry).unwrap();
        assert_eq!(unit.modules.len(), 4);
        assert_eq!(unit.modules[0].path, dir.path().join("shared.js"));
    }

    #[test]
    fn import_cycle_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "import './b.js'; export default {};").unwrap();
        fs::write(dir.path().join("b.js"), "import './a.js';").unwrap();

        let err = compile(&dir.path().join("a.js")).unwrap_err();
        assert!(err.to_string().contains("circular import"));
    }

    #[test]
    fn syntax_errors_fail_compilation() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("rift.config.ts");
        fs::write(&entry, "export default {").unwrap();

        assert!(matches!(
            compile(&entry),
            Err(ConfigLoadError::Compile { .. })
        ));
    }
}
