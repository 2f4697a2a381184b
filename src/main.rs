mod bgg;
mod catalog;
mod commands;
mod config;
mod diagnostics;
mod error;
mod fetcher;
mod http;
mod input;
mod logging;
mod normalizer;
mod pipeline;
mod ratelimit;
mod report;
mod resolver;
mod sink;
mod types;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands::RunOverrides;
use crate::config::Config;

/// Square cover thumbnails for a list of board games
#[derive(Parser)]
#[command(name = "gamethumb", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Config file (default: .gamethumb.toml in the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace). GAMETHUMB_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Resolve every name in INPUT, download its cover, and normalize it
    Run {
        /// One game name per line
        #[arg(default_value = "games.txt")]
        input: PathBuf,
        /// Catalog API root
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        /// Minimum milliseconds between catalog requests
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
        /// Keep raw downloads under originals/
        #[arg(long)]
        keep_originals: bool,
        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Parallel download workers
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
    /// Show how names resolve against the catalog, without downloading
    Resolve {
        /// Game names
        #[arg(required = true)]
        names: Vec<String>,
        /// Catalog API root
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        /// Minimum milliseconds between catalog requests
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Normalize local image files into square PNGs
    Normalize {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Write results here instead of next to each file
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Print the file-safe key derived from each name
    Key {
        /// Names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(Path::new("."), cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            diagnostics::print_error(&e);
            return ExitCode::FAILURE;
        },
    };
    let _log_guard = match logging::init(cli.verbose, config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            diagnostics::print_error(&e);
            return ExitCode::FAILURE;
        },
    };

    let result = match cli.command {
        Commands::Run { input, base_url, interval_ms, keep_originals, output, workers } => {
            let overrides = RunOverrides { base_url, interval_ms, keep_originals, output, workers };
            commands::run(&input, overrides, config)
        },
        Commands::Resolve { names, base_url, interval_ms, json } => {
            let overrides = RunOverrides { base_url, interval_ms, ..RunOverrides::default() };
            commands::resolve(&names, json, overrides, config)
        },
        Commands::Normalize { files, output } => commands::normalize(&files, output.as_deref(), &config),
        Commands::Key { names } => Ok(commands::key(&names)),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    };
}
