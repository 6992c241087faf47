//! Logging setup for the rift CLI.
//!
//! Library crates log through `tracing`; the dev server uses the dedicated
//! targets `rift::config`, `rift::watcher`, `rift::hmr` and `rift::bridge`
//! besides its module paths. All of them sit under the filters below.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "rift=debug,rift_config=debug,rift_server=debug,rift_cli=debug";
const QUIET_FILTER: &str = "rift=error,rift_config=error,rift_server=error,rift_cli=error";
const DEFAULT_FILTER: &str = "rift=info,rift_config=info,rift_server=info,rift_cli=info";

/// Initialize the tracing subscriber.
///
/// `--verbose` wins over `--quiet`; without either, `RUST_LOG` is honored
/// and info level is the fallback. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so these
    // only check the filters.

    #[test]
    fn test_verbose_filter_enables_debug() {
        let filter = filter_for(true, true).to_string();
        assert!(filter.contains("rift=debug"));
        assert!(filter.contains("rift_server=debug"));
    }

    #[test]
    fn test_quiet_filter() {
        let filter = filter_for(false, true).to_string();
        assert!(filter.contains("rift=error"));
    }
}
