//! messmgr - a terminal client for Mess Manager.
//!
//! Log meals, check balances and see the month's numbers for the whole mess
//! without opening the browser.

mod cli;
mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use messmgr_core::auth::platform_store;
use messmgr_core::{Config, SessionClient};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

// ============================================================================
// Constants
// ============================================================================

/// Daily-rotated log file name prefix in the cache directory
const LOG_FILE: &str = "messmgr.log";

/// Initialize the tracing subscriber for logging.
/// Returns the guard that flushes the log file on drop.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}; using defaults", e);
        Config::default()
    });
    let store = platform_store(Config::config_dir().ok().as_deref());
    let client = SessionClient::new(&config, store)?;
    info!(origin = %client.api_origin(), "messmgr starting");

    let signs_in = cli.command.signs_in();
    if let Err(e) = commands::run(cli.command, &client, &mut config).await {
        eprintln!("Error: {}", commands::error_message(&e, signs_in));
        std::process::exit(1);
    }
    Ok(())
}
