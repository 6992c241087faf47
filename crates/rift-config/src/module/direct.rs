//! Direct loading: data files and CommonJS-style scripts.
//!
//! Scripts are evaluated as `module.exports = ...` modules with `require()`
//! support. ES module syntax is reported with the same messages a CommonJS
//! runtime produces, which the resolver uses to fall back to compilation.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{AssignmentTarget, Expression, ModuleDeclaration, Statement};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;
use serde_json::{Map, Value};

use super::eval::{EvalResult, Require, Scope};
use super::externals::ExternalModules;
use super::{is_relative, resolve_relative};
use crate::error::{ConfigLoadError, Result};

/// Load a config module without compiling it.
///
/// # Errors
///
/// Returns `ConfigLoadError::Load` carrying an unsupported-syntax message if
/// the module uses `import` or `export`.
pub fn load_direct(path: &Path, externals: &dyn ExternalModules) -> Result<Value> {
    DirectLoader {
        externals,
        loading: RefCell::new(Vec::new()),
    }
    .load_file(path)
}

struct DirectLoader<'e> {
    externals: &'e dyn ExternalModules,
    /// Modules currently being evaluated, for cycle detection.
    loading: RefCell<Vec<PathBuf>>,
}

impl DirectLoader<'_> {
    fn load_file(&self, path: &Path) -> Result<Value> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "json" => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str(&content).map_err(|e| ConfigLoadError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
            "toml" => {
                let content = fs::read_to_string(path)?;
                let value: toml::Value =
                    toml::from_str(&content).map_err(|e| ConfigLoadError::Parse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                serde_json::to_value(value).map_err(|e| ConfigLoadError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
            "js" | "mjs" | "cjs" => self.load_script(path),
            other => Err(ConfigLoadError::UnsupportedFormat(other.to_string())),
        }
    }

    fn load_script(&self, path: &Path) -> Result<Value> {
        if self.loading.borrow().iter().any(|p| p == path) {
            return Err(ConfigLoadError::Load {
                path: path.to_path_buf(),
                message: "circular require".into(),
            });
        }

        let source = fs::read_to_string(path)?;
        let allocator = Allocator::default();
        let ParserReturn {
            program, errors, ..
        } = Parser::new(&allocator, &source, SourceType::mjs()).parse();

        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigLoadError::Parse {
                path: path.to_path_buf(),
                message,
            });
        }

        for stmt in &program.body {
            if let Some(decl) = stmt.as_module_declaration() {
                let message = match decl {
                    ModuleDeclaration::ImportDeclaration(_) => {
                        "Cannot use import statement outside a module"
                    }
                    _ => "Unexpected token 'export'",
                };
                return Err(ConfigLoadError::Load {
                    path: path.to_path_buf(),
                    message: message.into(),
                });
            }
        }

        self.loading.borrow_mut().push(path.to_path_buf());
        let result = self.evaluate(path, &program.body);
        self.loading.borrow_mut().pop();
        result
    }

    fn evaluate(&self, path: &Path, body: &[Statement<'_>]) -> Result<Value> {
        let require = ScriptRequire { loader: self, path };
        let mut scope = Scope::with_require(&require);
        let mut exports = Value::Object(Map::new());

        let evaluation_error = |message: String| ConfigLoadError::Evaluation {
            path: path.to_path_buf(),
            message,
        };

        for stmt in body {
            match stmt {
                Statement::VariableDeclaration(decl) => {
                    scope.bind_variables(decl).map_err(evaluation_error)?;
                }
                Statement::ExpressionStatement(expr) => {
                    if let Expression::AssignmentExpression(assign) = &expr.expression {
                        if is_module_exports(&assign.left) {
                            exports = scope.eval(&assign.right).map_err(evaluation_error)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(exports)
    }
}

struct ScriptRequire<'a, 'e> {
    loader: &'a DirectLoader<'e>,
    path: &'a Path,
}

impl Require for ScriptRequire<'_, '_> {
    fn require(&self, specifier: &str) -> EvalResult<Value> {
        if is_relative(specifier) {
            let resolved = resolve_relative(self.path, specifier).map_err(|e| e.to_string())?;
            return self.loader.load_file(&resolved).map_err(|e| e.to_string());
        }
        self.loader
            .externals
            .load(specifier)
            .ok_or_else(|| format!("Cannot find module '{specifier}'"))
    }
}

fn is_module_exports(target: &AssignmentTarget<'_>) -> bool {
    let AssignmentTarget::StaticMemberExpression(member) = target else {
        return false;
    };
    matches!(&member.object, Expression::Identifier(obj) if obj.name.as_str() == "module")
        && member.property.name.as_str() == "exports"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ExternalRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn loads_commonjs_with_relative_require() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shared.js"), "module.exports = { port: 4000 };").unwrap();
        let config = dir.path().join("rift.config.js");
        fs::write(
            &config,
            "const shared = require('./shared');\nmodule.exports = { port: shared.port, open: true };",
        )
        .unwrap();

        let value = load_direct(&config, &ExternalRegistry::new()).unwrap();
        assert_eq!(value, json!({ "port": 4000, "open": true }));
    }

    #[test]
    fn require_of_bare_specifier_uses_externals() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("rift.config.js");
        fs::write(
            &config,
            "const preset = require('rift-preset');\nmodule.exports = { alias: preset.alias };",
        )
        .unwrap();

        let mut externals = ExternalRegistry::new();
        externals.register("rift-preset", json!({ "alias": { "a": "/b" } }));

        let value = load_direct(&config, &externals).unwrap();
        assert_eq!(value, json!({ "alias": { "a": "/b" } }));
    }

    #[test]
    fn import_syntax_reports_recoverable_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("rift.config.js");
        fs::write(&config, "import x from './x.js';\nexport default {};").unwrap();

        let err = load_direct(&config, &ExternalRegistry::new()).unwrap_err();
        assert!(err.is_unsupported_syntax());
        assert!(err.to_string().contains("Cannot use import statement"));
    }

    #[test]
    fn export_syntax_reports_recoverable_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("rift.config.mjs");
        fs::write(&config, "export default { port: 1 };").unwrap();

        let err = load_direct(&config, &ExternalRegistry::new()).unwrap_err();
        assert!(err.is_unsupported_syntax());
    }

    #[test]
    fn evaluation_errors_are_fatal() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("rift.config.js");
        fs::write(&config, "module.exports = { port: missing };").unwrap();

        let err = load_direct(&config, &ExternalRegistry::new()).unwrap_err();
        assert!(!err.is_unsupported_syntax());
        assert!(matches!(err, ConfigLoadError::Evaluation { .. }));
    }

    #[test]
    fn loads_toml_data() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("rift.config.toml");
        fs::write(&config, "port = 8080\n[alias]\n\"/@/\" = \"/src/\"\n").unwrap();

        let value = load_direct(&config, &ExternalRegistry::new()).unwrap();
        assert_eq!(value, json!({ "port": 8080, "alias": { "/@/": "/src/" } }));
    }
}
