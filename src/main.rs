mod errors;
mod pager;
mod repl;
mod sql;
mod storage;

use std::fs::OpenOptions;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "ribtable", version = VERSION, about = "Tiny single-table SQL database.")]
struct Cli {
    /// Path to the database file. Created if it does not already exist.
    db_path: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_path = format!("{}.log", cli.db_path);
    if let Ok(file) = OpenOptions::new().append(true).create(true).open(&log_path) {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
            .init();
    }

    let table = match storage::Table::open(std::path::Path::new(&cli.db_path)) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match repl::run(table) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
