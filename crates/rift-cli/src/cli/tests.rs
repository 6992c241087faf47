#[cfg(test)]
mod tests {
    use crate::cli::validation::parse_mode;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_parse_mode_valid() {
        assert_eq!(parse_mode("development"), Ok("development".to_string()));
        assert_eq!(parse_mode("staging-eu"), Ok("staging-eu".to_string()));
        assert_eq!(parse_mode("e2e_test"), Ok("e2e_test".to_string()));
    }

    #[test]
    fn test_parse_mode_invalid() {
        assert_eq!(parse_mode("").unwrap_err(), "Mode cannot be empty");
        assert!(parse_mode("../prod").is_err());
        assert!(parse_mode("prod local").is_err());
        assert!(parse_mode("a.b").is_err());
    }

    #[test]
    fn test_dev_defaults() {
        let cli = Cli::try_parse_from(["rift", "dev"]).unwrap();
        let Command::Dev(args) = cli.command;
        assert_eq!(args.root, None);
        assert_eq!(args.mode, "development");
        assert_eq!(args.port, None);
        assert_eq!(args.host, None);
        assert!(!args.open);
        assert!(!args.editor_stdio);
        assert!(!args.force);
    }

    #[test]
    fn test_dev_all_flags() {
        let cli = Cli::try_parse_from([
            "rift",
            "dev",
            "site",
            "--mode",
            "staging",
            "--config",
            "rift.config.ts",
            "--port",
            "8080",
            "--host",
            "0.0.0.0",
            "--open",
            "--editor-stdio",
            "--force",
        ])
        .unwrap();
        let Command::Dev(args) = cli.command;
        assert_eq!(args.root, Some(PathBuf::from("site")));
        assert_eq!(args.mode, "staging");
        assert_eq!(args.config, Some(PathBuf::from("rift.config.ts")));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert!(args.open && args.editor_stdio && args.force);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rift", "dev", "--verbose", "--no-color"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.no_color);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["rift", "dev", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["rift", "dev", "--port", "70000"]).is_err());
    }
}
