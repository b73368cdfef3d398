//! Main entry point for snapmigrate CLI

use clap::Parser;
use snapmigrate::cli::Cli;
use snapmigrate::commands::execute_command;
use snapmigrate::process;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    // Snapshot metadata and diffs are only readable as root
    if let Err(e) = process::ensure_root() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    // Execute the command
    if let Err(e) = execute_command(cli) {
        eprintln!("Error: {}", e);
        if e.is_transient() {
            eprintln!("Re-running the same command is safe; archived snapshots are skipped.");
        }
        std::process::exit(1);
    }
}
