//! Configuration resolution for the rift dev server.
//!
//! [`resolve`] locates a project's config module, loads or compiles it,
//! merges plugin fragments and loads the environment files for a mode.

pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod manifest;
pub mod merge;
pub mod module;
pub mod resolve;

// Re-export main types
pub use config::*;
pub use error::*;

pub use discovery::{ConfigDiscovery, DEFAULT_CONFIG_FILES};
pub use env::{env_file_names, load_env};
pub use manifest::ProjectManifest;
pub use module::{ExecutableUnit, ExternalModules, ExternalRegistry, compile, execute};
pub use resolve::{ConfigResolver, resolve};
