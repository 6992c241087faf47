//! rift - development server with hot updates.

use clap::Parser;
use miette::Result;
use rift_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
    };

    // Errors leave through miette so the exit code is non-zero.
    result.map_err(error::cli_error_to_miette)
}
