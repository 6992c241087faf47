//! Execute phase: evaluate a compiled unit to the config value.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Declaration, ImportDeclarationSpecifier, ModuleDeclaration, ModuleExportName, Statement,
};
use oxc_parser::{Parser, ParserReturn};
use serde_json::{Map, Value};

use super::compile::{ExecutableUnit, ImportTarget, UnitModule};
use super::eval::Scope;
use super::externals::ExternalModules;
use super::source_type_for;
use crate::error::{ConfigLoadError, Result};

/// Evaluate `unit` and return its entry module's default export.
///
/// # Errors
///
/// Returns `ConfigLoadError::Evaluation` if any module uses unsupported
/// constructs, imports an unknown external, or the entry has no default
/// export.
pub fn execute(unit: &ExecutableUnit, externals: &dyn ExternalModules) -> Result<Value> {
    let mut evaluated: HashMap<PathBuf, Namespace> = HashMap::new();

    for module in &unit.modules {
        let namespace = evaluate_module(module, &evaluated, externals)?;
        evaluated.insert(module.path.clone(), namespace);
    }

    let entry = evaluated
        .remove(&unit.entry)
        .ok_or_else(|| ConfigLoadError::Evaluation {
            path: unit.entry.clone(),
            message: "entry module missing from compiled unit".into(),
        })?;

    entry.default.ok_or_else(|| ConfigLoadError::Evaluation {
        path: unit.entry.clone(),
        message: "config module has no default export".into(),
    })
}

/// Exports of one evaluated module.
#[derive(Debug, Clone, Default)]
struct Namespace {
    default: Option<Value>,
    named: Map<String, Value>,
}

impl Namespace {
    /// Namespace for a plain value: a CommonJS-style export or data file.
    fn from_value(value: Value) -> Self {
        let named = match &value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        Self {
            default: Some(value),
            named,
        }
    }

    fn as_object(&self) -> Value {
        let mut object = self.named.clone();
        if let Some(default) = &self.default {
            object.insert("default".into(), default.clone());
        }
        Value::Object(object)
    }

    fn export(&self, name: &str) -> Option<Value> {
        if name == "default" {
            return self.default.clone();
        }
        self.named.get(name).cloned()
    }
}

fn evaluate_module(
    module: &UnitModule,
    evaluated: &HashMap<PathBuf, Namespace>,
    externals: &dyn ExternalModules,
) -> Result<Namespace> {
    let path = module.path.as_path();
    let error = |message: String| ConfigLoadError::Evaluation {
        path: path.to_path_buf(),
        message,
    };

    let allocator = Allocator::default();
    let ParserReturn {
        program, errors, ..
    } = Parser::new(&allocator, &module.source, source_type_for(path)).parse();
    if !errors.is_empty() {
        return Err(ConfigLoadError::Compile {
            path: path.to_path_buf(),
            message: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        });
    }

    let imported = |specifier: &str| -> Result<Namespace> {
        let target = module
            .imports
            .get(specifier)
            .ok_or_else(|| error(format!("import '{specifier}' was not compiled")))?;
        load_target(target, evaluated, externals).map_err(error)
    };

    let mut scope = Scope::new();
    let mut exports = Namespace::default();

    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            if let Statement::VariableDeclaration(var) = stmt {
                scope.bind_variables(var).map_err(error)?;
            }
            continue;
        };

        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                if import.import_kind.is_type() {
                    continue;
                }
                let namespace = imported(import.source.value.as_str())?;
                let Some(specifiers) = &import.specifiers else {
                    continue;
                };
                for specifier in specifiers {
                    match specifier {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            let value = namespace
                                .export("default")
                                .ok_or_else(|| error(format!(
                                    "'{}' has no default export",
                                    import.source.value
                                )))?;
                            scope.bind(s.local.name.to_string(), value);
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            scope.bind(s.local.name.to_string(), namespace.as_object());
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            let name = export_name(&s.imported);
                            let value = namespace.export(&name).ok_or_else(|| {
                                error(format!(
                                    "'{}' has no export named '{name}'",
                                    import.source.value
                                ))
                            })?;
                            scope.bind(s.local.name.to_string(), value);
                        }
                    }
                }
            }
            ModuleDeclaration::ExportDefaultDeclaration(export) => {
                let expr = export
                    .declaration
                    .as_expression()
                    .ok_or_else(|| error("default export must be an expression".into()))?;
                exports.default = Some(scope.eval(expr).map_err(error)?);
            }
            ModuleDeclaration::ExportNamedDeclaration(export) => {
                if export.export_kind.is_type() {
                    continue;
                }
                if let Some(Declaration::VariableDeclaration(var)) = &export.declaration {
                    for name in scope.bind_variables(var).map_err(error)? {
                        let value = scope.lookup(&name).cloned().unwrap_or(Value::Null);
                        exports.named.insert(name, value);
                    }
                }

                let source = match &export.source {
                    Some(source) => Some(imported(source.value.as_str())?),
                    None => None,
                };
                for specifier in &export.specifiers {
                    if specifier.export_kind.is_type() {
                        continue;
                    }
                    let local = export_name(&specifier.local);
                    let value = match &source {
                        Some(namespace) => namespace.export(&local),
                        None => scope.lookup(&local).cloned(),
                    }
                    .ok_or_else(|| error(format!("'{local}' is not defined")))?;

                    let exported = export_name(&specifier.exported);
                    if exported == "default" {
                        exports.default = Some(value);
                    } else {
                        exports.named.insert(exported, value);
                    }
                }
            }
            ModuleDeclaration::ExportAllDeclaration(export) => {
                let namespace = imported(export.source.value.as_str())?;
                match &export.exported {
                    Some(alias) => {
                        exports
                            .named
                            .insert(export_name(alias), namespace.as_object());
                    }
                    None => {
                        for (name, value) in namespace.named {
                            exports.named.entry(name).or_insert(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(exports)
}

fn load_target(
    target: &ImportTarget,
    evaluated: &HashMap<PathBuf, Namespace>,
    externals: &dyn ExternalModules,
) -> std::result::Result<Namespace, String> {
    match target {
        ImportTarget::Bundled(path) => evaluated
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{} was not evaluated before use", path.display())),
        ImportTarget::Data(path) => load_data(path).map(Namespace::from_value),
        ImportTarget::External(specifier) => externals
            .load(specifier)
            .map(Namespace::from_value)
            .ok_or_else(|| format!("Cannot find module '{specifier}'")),
    }
}

fn load_data(path: &Path) -> std::result::Result<Value, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ExternalRegistry, compile};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn evaluates_typescript_config_with_relative_imports() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("shared.ts"),
            "export const port: number = 4000;\nexport default { open: true };",
        )
        .unwrap();
        fs::write(dir.path().join("aliases.json"), r#"{ "/@/": "/src/" }"#).unwrap();
        let entry = dir.path().join("rift.config.ts");
        fs::write(
            &entry,
            r#"
            import base, { port } from "./shared";
            import alias from "./aliases.json";
            interface Local { port: number }
            export default defineConfig({ ...base, port, alias });
            "#,
        )
        .unwrap();

        let unit = compile(&entry).unwrap();
        let value = execute(&unit, &ExternalRegistry::new()).unwrap();

        assert_eq!(
            value,
            json!({ "open": true, "port": 4000, "alias": { "/@/": "/src/" } })
        );
    }

    #[test]
    fn externals_resolve_through_registry() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("rift.config.js");
        fs::write(
            &entry,
            "import preset, { jsx } from 'rift-preset';\nexport default { jsx, plugins: [preset] };",
        )
        .unwrap();

        let mut externals = ExternalRegistry::new();
        externals.register("rift-preset", json!({ "name": "preset", "jsx": "preact" }));

        let unit = compile(&entry).unwrap();
        let value = execute(&unit, &externals).unwrap();
        assert_eq!(value["jsx"], "preact");
        assert_eq!(value["plugins"][0]["name"], "preset");
    }

    #[test]
    fn unknown_external_is_an_evaluation_error() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("rift.config.js");
        fs::write(&entry, "import x from 'nope';\nexport default { x };").unwrap();

        let unit = compile(&entry).unwrap();
        let err = execute(&unit, &ExternalRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("Cannot find module 'nope'"));
    }

    #[test]
    fn missing_default_export_is_reported() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("rift.config.js");
        fs::write(&entry, "export const port = 1;").unwrap();

        let unit = compile(&entry).unwrap();
        let err = execute(&unit, &ExternalRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("no default export"));
    }

    #[test]
    fn export_specifier_can_name_default() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("rift.config.js");
        fs::write(&entry, "const config = { port: 9 };\nexport { config as default };").unwrap();

        let unit = compile(&entry).unwrap();
        assert_eq!(
            execute(&unit, &ExternalRegistry::new()).unwrap(),
            json!({ "port": 9 })
        );
    }
}
