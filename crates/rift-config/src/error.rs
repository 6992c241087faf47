//! Error types for configuration discovery, evaluation and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigLoadError>;

/// Messages produced by the direct loader when a config module uses syntax
/// that only the compile path understands. A direct-load failure whose
/// message contains one of these falls back to compilation; any other
/// failure is fatal.
pub const UNSUPPORTED_SYNTAX_SIGNATURES: &[&str] =
    &["Cannot use import statement", "Unexpected token 'export'"];

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    // Discovery
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    // Parsing / evaluation
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to load {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },

    #[error("failed to compile {}: {message}", .path.display())]
    Compile { path: PathBuf, message: String },

    #[error("config evaluation failed in {}: {message}", .path.display())]
    Evaluation { path: PathBuf, message: String },

    #[error("cannot resolve '{specifier}' imported from {}", .importer.display())]
    Unresolved { specifier: String, importer: PathBuf },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    // Environment files
    #[error("failed to parse env file {}: {message}", .path.display())]
    Env { path: PathBuf, message: String },

    // Project manifest
    #[error("invalid project manifest {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigLoadError {
    /// Whether this error is a direct-load failure that the compile path can
    /// recover from.
    pub fn is_unsupported_syntax(&self) -> bool {
        match self {
            ConfigLoadError::Load { message, .. } => UNSUPPORTED_SYNTAX_SIGNATURES
                .iter()
                .any(|signature| message.contains(signature)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_with_import_signature_is_recoverable() {
        let err = ConfigLoadError::Load {
            path: PathBuf::from("rift.config.js"),
            message: "Cannot use import statement outside a module".into(),
        };
        assert!(err.is_unsupported_syntax());
    }

    #[test]
    fn other_errors_are_fatal() {
        let err = ConfigLoadError::Load {
            path: PathBuf::from("rift.config.js"),
            message: "unexpected token".into(),
        };
        assert!(!err.is_unsupported_syntax());

        let err = ConfigLoadError::Parse {
            path: PathBuf::from("rift.config.js"),
            message: "Unexpected token 'export'".into(),
        };
        assert!(!err.is_unsupported_syntax());
    }
}
