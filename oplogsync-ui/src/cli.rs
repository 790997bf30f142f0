// The command-line surface (§6), parsed with `clap`'s derive API into a
// typed config. Validated at parse time; a malformed invocation is fatal
// before any dial is attempted, per the error taxonomy's "configuration
// error" kind.

use clap::{Parser, ValueEnum};

use crate::hostport::parse_hostport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// One-way live replicator from a source document-database replica set to a
/// destination instance.
#[derive(Parser, Debug)]
#[command(name = "oplogsync", version, about)]
pub struct Cli {
    /// Source, a member of a replica set. `host:port`.
    #[arg(long, value_parser = parse_hostport)]
    pub from: String,

    /// Destination, a standalone instance or routing proxy. `host:port`.
    #[arg(long, value_parser = parse_hostport)]
    pub to: String,

    /// Replay the oplog only; skip the initial bulk copy.
    #[arg(long)]
    pub oplog: bool,

    /// Start tailing from this second (counter = 0). Requires `--oplog`.
    #[arg(long = "start-optime", requires = "oplog")]
    pub start_optime: Option<u32>,

    /// Initial sync writes with upsert-by-_id instead of batch insert.
    #[arg(long)]
    pub upsert: bool,

    /// Skip recreating indexes during initial sync.
    #[arg(long = "ignore-index")]
    pub ignore_index: bool,

    /// Override the worker-pool size (default: min(num_cpus, 32)).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Structured log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Parses `std::env::args()`, exiting the process with clap's usage
    /// message on a malformed invocation (§7: configuration errors are
    /// fatal before the engine starts).
    pub fn parse_args() -> Cli {
        Cli::parse()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_from_without_colon() {
        let result = Cli::try_parse_from(["oplogsync", "--from", "localhost", "--to", "dst:27017"]);
        assert!(result.is_err());
    }

    #[test]
    fn start_optime_requires_oplog_flag() {
        let result = Cli::try_parse_from([
            "oplogsync",
            "--from",
            "src:27017",
            "--to",
            "dst:27017",
            "--start-optime",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_minimal_valid_invocation() {
        let cli = Cli::try_parse_from(["oplogsync", "--from", "src:27017", "--to", "dst:27017"]).unwrap();
        assert_eq!(cli.from, "src:27017");
        assert_eq!(cli.to, "dst:27017");
        assert!(!cli.oplog);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn verbose_flag_is_repeatable() {
        let cli =
            Cli::try_parse_from(["oplogsync", "--from", "src:27017", "--to", "dst:27017", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn start_optime_with_oplog_is_accepted() {
        let cli = Cli::try_parse_from([
            "oplogsync",
            "--from",
            "src:27017",
            "--to",
            "dst:27017",
            "--oplog",
            "--start-optime",
            "1700000000",
        ])
        .unwrap();
        assert_eq!(cli.start_optime, Some(1_700_000_000));
    }
}
