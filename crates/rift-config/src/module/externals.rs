use std::collections::HashMap;

use serde_json::Value;

/// Supplies values for specifiers that are left external to a config
/// module: bare package names and the like.
pub trait ExternalModules: Send + Sync {
    /// The module's value, or `None` if the specifier is unknown.
    fn load(&self, specifier: &str) -> Option<Value>;
}

/// In-memory registry of external module values.
#[derive(Debug, Clone, Default)]
pub struct ExternalRegistry {
    modules: HashMap<String, Value>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, specifier: impl Into<String>, value: Value) -> &mut Self {
        self.modules.insert(specifier.into(), value);
        self
    }
}

impl ExternalModules for ExternalRegistry {
    fn load(&self, specifier: &str) -> Option<Value> {
        self.modules.get(specifier).cloned()
    }
}
