//! Miette diagnostic conversion for CLI errors.

use crate::error::CliError;
use miette::Report;
use rift_config::ConfigLoadError;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => config_error_to_miette(e),
        CliError::Server(rift_server::ServerError::Bind { addr, source }) => miette::miette!(
            help = "Pick another port with --port or RIFT_PORT",
            "Failed to bind to {}: {}",
            addr,
            source
        ),
        _ => miette::miette!("{}", err),
    }
}

fn config_error_to_miette(err: ConfigLoadError) -> Report {
    match err {
        ConfigLoadError::NotFound(path) => miette::miette!(
            help = "Check the --config path",
            "Config file not found: {}",
            path.display()
        ),
        ConfigLoadError::Unresolved {
            specifier,
            importer,
        } => miette::miette!(
            help = "Only relative imports are bundled into the config module",
            "Cannot resolve '{}' imported from {}",
            specifier,
            importer.display()
        ),
        other => miette::miette!("Configuration error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_config_not_found_has_help() {
        let report = cli_error_to_miette(CliError::Config(ConfigLoadError::NotFound(
            PathBuf::from("rift.config.js"),
        )));
        assert!(report.to_string().contains("rift.config.js"));
        assert!(report.help().is_some());
    }

    #[test]
    fn test_other_errors_keep_message() {
        let report = cli_error_to_miette(CliError::InvalidArgument("root".to_string()));
        assert_eq!(report.to_string(), "Invalid argument: root");
    }
}
