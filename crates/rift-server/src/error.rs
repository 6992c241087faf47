//! Error types for the dev server.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// A file could not be read through the content store.
#[derive(Debug, Error)]
pub enum ContentReadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContentReadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentReadError::NotFound(_))
    }
}

/// A pipeline stage could not be installed. Fatal at startup.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("unknown server stage '{0}'")]
    UnknownStage(String),

    #[error("invalid transform '{name}': {message}")]
    InvalidTransform { name: String, message: String },

    #[error("invalid proxy target for '{prefix}': {message}")]
    InvalidProxy { prefix: String, message: String },

    #[error("stage '{stage}' failed to install: {message}")]
    Stage { stage: String, message: String },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Config(#[from] rift_config::ConfigLoadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
