//! CLI entry point for taskdex.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use taskdex_index::IndexerConfig;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

/// Incremental task index kept in a snapshot file between runs.
#[derive(Parser, Debug)]
#[command(
    name = "taskdex",
    version,
    about = "taskdex: index tasks parsed from files and query them by tag, project, date and priority"
)]
struct Cli {
    /// Snapshot file holding the index between runs.
    #[arg(long, default_value = ".taskdex/snapshot.json")]
    snapshot: PathBuf,

    /// Directory containing `.taskdex/config.toml` (defaults to current).
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the tasks of a file with parsed tasks read as JSON.
    Ingest {
        #[arg(long)]
        path: String,
        /// Modification time of the file in unix milliseconds.
        #[arg(long)]
        mtime: Option<i64>,
        /// JSON array of tasks; `-` reads standard input.
        #[arg(long)]
        tasks: PathBuf,
    },

    /// Drop the tasks of a file, keeping its mtime record.
    Remove {
        #[arg(long)]
        path: String,
    },

    /// Forget a file entirely: tasks, mtime and processed time.
    Cleanup {
        #[arg(long)]
        path: String,
    },

    /// Report whether a file must be re-parsed at the given mtime.
    Status {
        #[arg(long)]
        path: String,
        #[arg(long)]
        mtime: i64,
    },

    /// Query tasks, e.g. `-f "tag contains #work" -f "or:priority > 2" -s priority:desc`.
    Query {
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,
        #[arg(short = 's', long = "sort")]
        sort: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Prune orphaned mtime records and print a consistency report.
    Check,

    /// Print index statistics.
    Stats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let Cli {
        snapshot,
        root,
        cmd,
    } = Cli::parse();

    install_tracing();

    let root = root.unwrap_or_else(|| PathBuf::from("."));
    let config = IndexerConfig::from_root(&root)?;
    commands::run(cmd, &snapshot, config, &mut io::stdout().lock())
}

fn install_tracing() {
    // RUST_LOG overrides the default INFO level.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ingest_command() {
        let cli = Cli::parse_from([
            "taskdex",
            "--snapshot",
            "state.json",
            "ingest",
            "--path",
            "notes/a.md",
            "--mtime",
            "1000",
            "--tasks",
            "-",
        ]);

        assert_eq!(cli.snapshot, PathBuf::from("state.json"));
        match cli.cmd {
            Command::Ingest { path, mtime, tasks } => {
                assert_eq!(path, "notes/a.md");
                assert_eq!(mtime, Some(1000));
                assert_eq!(tasks, PathBuf::from("-"));
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn parse_query_command() {
        let cli = Cli::parse_from([
            "taskdex",
            "query",
            "-f",
            "tag contains #work",
            "--filter",
            "or:priority > 2",
            "-s",
            "priority:desc",
            "--format",
            "json",
        ]);

        match cli.cmd {
            Command::Query {
                filters,
                sort,
                format,
            } => {
                assert_eq!(filters, vec!["tag contains #work", "or:priority > 2"]);
                assert_eq!(sort, vec!["priority:desc"]);
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn snapshot_defaults_under_taskdex_dir() {
        let cli = Cli::parse_from(["taskdex", "stats"]);
        assert_eq!(cli.snapshot, PathBuf::from(".taskdex/snapshot.json"));
        assert!(matches!(cli.cmd, Command::Stats));
    }
}
