//! movenet-sync: keep MoveNet model artifacts in object storage current.
//!
//! # Usage
//!
//! ```text
//! movenet-sync                      # same as `run` with no flags
//! movenet-sync run [--variant <name>]... [--model-version <stamp>] [--variants-file <path>] [--json]
//! movenet-sync variants [--variants-file <path>] [--json]
//! ```
//!
//! Settings come from the environment (a `.env` file in the working
//! directory is loaded first). Exit codes: `0` every variant published or
//! skipped, `1` at least one variant failed, `2` configuration or setup
//! error, `130` interrupted.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{run::RunArgs, variants::VariantsArgs};

/// Configuration or setup failure; nothing was attempted.
const EXIT_FATAL: u8 = 2;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "movenet-sync",
    version,
    about = "Sync MoveNet model artifacts into versioned and stable object storage paths",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, hash, and publish every configured variant that changed (default).
    Run(RunArgs),

    /// Show the resolved variants and where they would be published.
    Variants(VariantsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => args.run(),
        Commands::Variants(args) => args.run(),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
