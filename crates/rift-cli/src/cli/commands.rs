use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::validation::parse_mode;

/// Available rift subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    ///
    /// Resolves the project's config module, installs the request pipeline
    /// and serves until interrupted. Changes on disk, or in the editor with
    /// --editor-stdio, are pushed to connected browsers.
    Dev(DevArgs),
}

/// Arguments for the dev command
#[derive(Args, Debug, Clone)]
pub struct DevArgs {
    /// Project root (defaults to the current directory)
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Mode used to select environment files
    ///
    /// Loads `.env`, `.env.local`, `.env.<mode>` and `.env.<mode>.local`
    /// from the project root, later files winning.
    #[arg(short, long, default_value = "development", value_parser = parse_mode)]
    pub mode: String,

    /// Config module to load instead of searching the root
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    ///
    /// Overrides the config module's `port` and `RIFT_PORT`.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host to listen on
    ///
    /// Overrides the config module's `host` and `RIFT_HOST`.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Open the browser once the server is listening
    #[arg(long)]
    pub open: bool,

    /// Read editor buffer notifications as JSON lines from stdin
    #[arg(long)]
    pub editor_stdio: bool,

    /// Start even when package.json's dev script does not run rift
    #[arg(long)]
    pub force: bool,
}
