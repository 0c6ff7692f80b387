//! trim CLI - live-reloading static HTML dev server.
//!
//! Serves a directory over HTTP, minifies HTML on the fly and reloads open
//! browser tabs when any file they loaded changes.

mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::ServeArgs;
use output::Output;

/// trim - live-reloading static HTML dev server.
#[derive(Parser)]
#[command(name = "trim", version, about)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // Initialize tracing with appropriate log level
    // --verbose enables INFO level plus request traces, otherwise RUST_LOG (ERROR when unset)
    let filter = if cli.serve.verbose {
        EnvFilter::new("info,tower_http=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(cli.serve.execute()),
        Err(e) => Err(e.into()),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
