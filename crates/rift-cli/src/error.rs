//! Error handling for the rift CLI.
//!
//! Library errors convert into [`CliError`] through `#[from]`; `main`
//! turns the result into a miette report.

mod miette;

use std::path::PathBuf;
use thiserror::Error;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Config module discovery, evaluation or env file loading failed
    #[error("Configuration error: {0}")]
    Config(#[from] rift_config::ConfigLoadError),

    /// The project's package.json does not run rift
    #[error("{}", manifest_message(.path, .dev_script))]
    Manifest {
        path: PathBuf,
        dev_script: Option<String>,
    },

    /// Layered listen settings could not be extracted
    #[error("Invalid server settings: {0}\n\nHint: Check RIFT_PORT, RIFT_HOST and the config module's port/host")]
    Settings(#[from] figment::Error),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stage install, bind or transport failures
    #[error("Server error: {0}")]
    Server(#[from] rift_server::ServerError),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

fn manifest_message(path: &std::path::Path, dev_script: &Option<String>) -> String {
    let found = match dev_script {
        Some(script) => format!("scripts.dev is \"{script}\""),
        None => "scripts.dev is missing".to_string(),
    };
    format!(
        "{} does not run rift ({found})\n\nHint: Set \"dev\": \"rift dev\" in package.json or pass --force",
        path.display()
    )
}

impl From<rift_server::InstallError> for CliError {
    fn from(err: rift_server::InstallError) -> Self {
        CliError::Server(err.into())
    }
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message with `msg`.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{err}\n\nHint: {hint}"))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{msg}: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_mentions_force() {
        let err = CliError::Manifest {
            path: PathBuf::from("/p/package.json"),
            dev_script: Some("vite".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("/p/package.json"));
        assert!(msg.contains("\"vite\""));
        assert!(msg.contains("--force"));
    }

    #[test]
    fn test_manifest_error_missing_script() {
        let err = CliError::Manifest {
            path: PathBuf::from("package.json"),
            dev_script: None,
        };
        assert!(err.to_string().contains("scripts.dev is missing"));
    }

    #[test]
    fn test_cli_error_from_config_error() {
        let err: CliError = rift_config::ConfigLoadError::NotFound(PathBuf::from("x.js")).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("x.js"));
    }

    #[test]
    fn test_cli_error_from_install_error() {
        let err: CliError = rift_server::InstallError::UnknownStage("nope".to_string()).into();
        assert!(matches!(err, CliError::Server(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_result_ext_with_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let err = result.with_path("/test/site").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_result_ext_with_hint() {
        let result: Result<()> = Err(CliError::InvalidArgument("root".to_string()));
        let msg = result.with_hint("Pass a directory").unwrap_err().to_string();
        assert!(msg.contains("Invalid argument: root"));
        assert!(msg.contains("Hint: Pass a directory"));
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let msg = result.context("Failed to read stdin").unwrap_err().to_string();
        assert_eq!(msg, "Failed to read stdin: I/O error: boom");
    }
}
