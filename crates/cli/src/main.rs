//! Tally CLI: allocate daily case IDs and track case reports.
//!
//! `tally [--db PATH | --cache] [--json | --raw] COMMAND`: runs one command
//! against the database and exits. Logging goes to stderr and is controlled
//! by `RUST_LOG` (default `warn`).

mod commands;
mod format;
mod parse;
mod state;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use tally_engine::Database;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_error, format_output, OutputMode};
use parse::matches_to_action;
use state::SessionState;

fn main() {
    init_logging();

    let matches = build_cli().get_matches();

    let output_mode = if matches.get_flag("json") {
        OutputMode::Json
    } else if matches.get_flag("raw") {
        OutputMode::Raw
    } else {
        OutputMode::Human
    };

    let db = match open_database(&matches) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("(error) {:#}", e);
            process::exit(1);
        }
    };

    let state = SessionState::new(db);
    let exit_code = run_shell_mode(&matches, &state, output_mode);

    if let Err(e) = state.close() {
        eprintln!("{}", format_error(&e, output_mode));
        process::exit(1);
    }
    process::exit(exit_code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_database(matches: &clap::ArgMatches) -> anyhow::Result<Arc<Database>> {
    if matches.get_flag("cache") {
        return Database::ephemeral().context("Failed to open cache database");
    }

    let path = matches
        .get_one::<String>("db")
        .map(|s| s.as_str())
        .unwrap_or(".tally");

    Database::open(path).with_context(|| format!("Failed to open database at {}", path))
}

fn run_shell_mode(matches: &clap::ArgMatches, state: &SessionState, mode: OutputMode) -> i32 {
    match matches_to_action(matches) {
        Ok(action) => match state.execute(action) {
            Ok(output) => {
                let formatted = format_output(&output, mode);
                if !formatted.is_empty() {
                    println!("{}", formatted);
                }
                0
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                1
            }
        },
        Err(e) => {
            eprintln!("(error) {}", e);
            1
        }
    }
}
