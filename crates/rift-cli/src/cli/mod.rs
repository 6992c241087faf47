//! Command-line interface definition.
//!
//! - `rift dev` - serve a project with hot updates

mod commands;
mod tests;
mod validation;

use clap::Parser;

pub use commands::{Command, DevArgs};
pub use validation::parse_mode;

/// rift - a development server with hot updates
#[derive(Parser, Debug)]
#[command(
    name = "rift",
    version,
    about = "A development server with hot updates",
    long_about = "rift serves a project's sources as native ES modules, compiling\n\
                  components, stylesheets and TypeScript on request, and pushes\n\
                  updates to the browser as files change on disk or in the editor."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
