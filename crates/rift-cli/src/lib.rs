//! rift CLI.
//!
//! Wraps [`rift_server::DevServer`] behind the `rift dev` command:
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - command implementations
//! - [`error`] - CLI errors and their conversion to diagnostics
//! - [`logger`] - tracing setup
//! - [`settings`] - layered listen settings
//! - [`ui`] - status lines on stderr

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod settings;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
