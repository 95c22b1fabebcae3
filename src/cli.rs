use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{LevelFilter, Log, Metadata, Record};

#[derive(Parser)]
#[command(name = "nusyn")]
#[command(about = "Syntax analyzer for nu scripts")]
pub struct Cli {
    /// TOML file with a [limits] table
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log parser decisions to stderr (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a source file and print the syntax tree
    Parse(ParseArgs),
    /// Print the token stream with byte ranges
    Tokens(FileArgs),
    /// Report diagnostics; exits with status 1 if there are syntax errors
    Check(FileArgs),
}

#[derive(clap::Args)]
pub struct ParseArgs {
    /// Input file path
    pub file: PathBuf,

    /// Show the byte range of every node
    #[arg(long)]
    pub spans: bool,

    /// Print the tree, trivia and diagnostics as JSON
    #[arg(long, conflicts_with = "spans")]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct FileArgs {
    /// Input file path
    pub file: PathBuf,
}

// Minimal stderr sink for the `log` facade; filtering is left to `log::max_level`
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the stderr logger when `-v` was given
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => return,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
