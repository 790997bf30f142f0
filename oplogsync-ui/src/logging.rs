// Logging setup (§4.7): every process output in §6 goes through `tracing`;
// `tracing-subscriber`'s `EnvFilter` picks verbosity from `RUST_LOG` when
// set, falling back to a level derived from repeated `-v` flags.

use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, LogFormat};

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global `tracing` subscriber. Call once, before any other
/// code logs.
pub fn init(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli.verbose)));

    match cli.log_format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
    }
}
