//! Data-only expression evaluation over the oxc AST.
//!
//! Config modules are evaluated without a JavaScript engine. Only the subset
//! of expressions that can be reduced to plain data is understood; anything
//! else (functions, arbitrary calls, operators with side effects) is
//! rejected with a message naming the construct.

use std::collections::HashMap;

use oxc_ast::ast::{
    ArrayExpressionElement, Argument, BindingPatternKind, Expression, ObjectPropertyKind,
    PropertyKind, TemplateLiteral, VariableDeclaration,
};
use serde_json::{Map, Number, Value};

pub(crate) type EvalResult<T> = std::result::Result<T, String>;

/// Resolves `require(...)` calls for CommonJS-style config scripts.
pub(crate) trait Require {
    fn require(&self, specifier: &str) -> EvalResult<Value>;
}

/// Identifier bindings visible to a module during evaluation.
pub(crate) struct Scope<'r> {
    bindings: HashMap<String, Value>,
    require: Option<&'r dyn Require>,
}

impl<'r> Scope<'r> {
    pub(crate) fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            require: None,
        }
    }

    pub(crate) fn with_require(require: &'r dyn Require) -> Self {
        Self {
            bindings: HashMap::new(),
            require: Some(require),
        }
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Bind every declarator of a `const`/`let`/`var` declaration.
    ///
    /// Returns the bound names in declaration order.
    pub(crate) fn bind_variables(
        &mut self,
        declaration: &VariableDeclaration<'_>,
    ) -> EvalResult<Vec<String>> {
        let mut names = Vec::with_capacity(declaration.declarations.len());
        for declarator in &declaration.declarations {
            let BindingPatternKind::BindingIdentifier(ident) = &declarator.id.kind else {
                return Err("destructuring declarations are not supported".into());
            };
            let value = match &declarator.init {
                Some(init) => self.eval(init)?,
                None => Value::Null,
            };
            let name = ident.name.to_string();
            self.bind(name.clone(), value);
            names.push(name);
        }
        Ok(names)
    }

    pub(crate) fn eval(&self, expr: &Expression<'_>) -> EvalResult<Value> {
        match expr {
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NumericLiteral(lit) => number(lit.value),
            Expression::StringLiteral(lit) => Ok(Value::String(lit.value.to_string())),
            Expression::TemplateLiteral(tpl) => self.eval_template(tpl),
            Expression::Identifier(ident) => self.eval_identifier(ident.name.as_str()),
            Expression::ObjectExpression(object) => {
                let mut map = Map::new();
                for property in &object.properties {
                    match property {
                        ObjectPropertyKind::ObjectProperty(prop) => {
                            if prop.method || !matches!(prop.kind, PropertyKind::Init) {
                                return Err("methods and accessors are not supported".into());
                            }
                            let key = match prop.key.static_name() {
                                Some(name) if !prop.computed => name.into_owned(),
                                _ => {
                                    let key_expr = prop
                                        .key
                                        .as_expression()
                                        .ok_or("unsupported property key")?;
                                    to_key(&self.eval(key_expr)?)?
                                }
                            };
                            map.insert(key, self.eval(&prop.value)?);
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            match self.eval(&spread.argument)? {
                                Value::Object(inner) => map.extend(inner),
                                Value::Null => {}
                                _ => return Err("only objects can be spread into objects".into()),
                            }
                        }
                    }
                }
                Ok(Value::Object(map))
            }
            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            match self.eval(&spread.argument)? {
                                Value::Array(inner) => items.extend(inner),
                                _ => return Err("only arrays can be spread into arrays".into()),
                            }
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Null),
                        other => {
                            let expr = other.as_expression().ok_or("unsupported array element")?;
                            items.push(self.eval(expr)?);
                        }
                    }
                }
                Ok(Value::Array(items))
            }
            Expression::UnaryExpression(unary) => {
                let argument = self.eval(&unary.argument)?;
                match unary.operator.as_str() {
                    "!" => Ok(Value::Bool(!truthy(&argument))),
                    "-" => number(-as_f64(&argument)?),
                    "+" => number(as_f64(&argument)?),
                    "void" => Ok(Value::Null),
                    op => Err(format!("unary operator '{op}' is not supported")),
                }
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                match logical.operator.as_str() {
                    "||" if truthy(&left) => Ok(left),
                    "&&" if !truthy(&left) => Ok(left),
                    "??" if !left.is_null() => Ok(left),
                    _ => self.eval(&logical.right),
                }
            }
            Expression::ConditionalExpression(cond) => {
                if truthy(&self.eval(&cond.test)?) {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::TSAsExpression(ts) => self.eval(&ts.expression),
            Expression::TSSatisfiesExpression(ts) => self.eval(&ts.expression),
            Expression::TSNonNullExpression(ts) => self.eval(&ts.expression),
            Expression::StaticMemberExpression(member) => {
                let object = self.eval(&member.object)?;
                Ok(property(&object, member.property.name.as_str()))
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.eval(&member.object)?;
                let key = self.eval(&member.expression)?;
                match (&object, &key) {
                    (Value::Array(items), Value::Number(n)) => Ok(n
                        .as_u64()
                        .and_then(|i| items.get(i as usize).cloned())
                        .unwrap_or(Value::Null)),
                    _ => Ok(property(&object, &to_key(&key)?)),
                }
            }
            Expression::CallExpression(call) => {
                let Expression::Identifier(callee) = &call.callee else {
                    return Err("only defineConfig() and require() calls are supported".into());
                };
                let argument = match call.arguments.first() {
                    Some(Argument::SpreadElement(_)) | None => None,
                    Some(arg) => arg.as_expression(),
                };
                match (callee.name.as_str(), argument) {
                    ("defineConfig", Some(arg)) => self.eval(arg),
                    ("require", Some(Expression::StringLiteral(specifier))) => {
                        let require = self
                            .require
                            .ok_or("require() is not available in ES modules")?;
                        require.require(specifier.value.as_str())
                    }
                    (name, _) => Err(format!("call to '{name}' is not supported")),
                }
            }
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
                Err("functions are not supported in a data-only config".into())
            }
            _ => Err("unsupported expression in config module".into()),
        }
    }

    fn eval_identifier(&self, name: &str) -> EvalResult<Value> {
        if name == "undefined" {
            return Ok(Value::Null);
        }
        self.lookup(name)
            .cloned()
            .ok_or_else(|| format!("'{name}' is not defined"))
    }

    fn eval_template(&self, tpl: &TemplateLiteral<'_>) -> EvalResult<Value> {
        let mut out = String::new();
        for (index, quasi) in tpl.quasis.iter().enumerate() {
            match &quasi.value.cooked {
                Some(cooked) => out.push_str(cooked.as_str()),
                None => out.push_str(quasi.value.raw.as_str()),
            }
            if let Some(expr) = tpl.expressions.get(index) {
                out.push_str(&to_display(&self.eval(expr)?));
            }
        }
        Ok(Value::String(out))
    }
}

/// Convert a JS number, keeping integral values integral so they deserialize
/// into integer fields.
fn number(value: f64) -> EvalResult<Value> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| "non-finite numbers are not supported".into())
}

fn as_f64(value: &Value) -> EvalResult<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| "invalid number".into()),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not a number")),
        _ => Err("objects cannot be converted to numbers".into()),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_key(value: &Value) -> EvalResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err("computed keys must be strings or numbers".into()),
    }
}

fn to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "undefined".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn property(object: &Value, key: &str) -> Value {
    match object {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) if key == "length" => Value::from(items.len()),
        Value::String(s) if key == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}
