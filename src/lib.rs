pub mod audio;
pub mod clients;
pub mod commands;
pub mod config;
pub mod error;
pub mod item;
pub mod script;
pub mod store;
pub mod worker;

use clap::Parser;
use commands::{Cli, Command};
use config::Config;
use error::AppResult;
use std::process::ExitCode;
use std::time::Duration;
use store::Store;
use tracing_subscriber::EnvFilter;

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let wait = cli.command.wait_seconds();
    let success = match execute(cli) {
        Ok(success) => success,
        Err(e) => {
            log::error!("{}", e);
            false
        }
    };

    if wait > 0 {
        log::info!("Waiting {}s before exit", wait);
        std::thread::sleep(Duration::from_secs(wait));
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one command. `Ok(false)` means the run finished with item failures.
fn execute(cli: Cli) -> AppResult<bool> {
    let config = Config::load(cli.config.as_deref())?;
    let store = Store::open(&config.data_dir)?;
    log::info!("papercast v{} using {:?}", env!("CARGO_PKG_VERSION"), store.path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let report = match &cli.command {
        Command::Acquire(args) => runtime.block_on(commands::stages::acquire(&config, &store, args))?,
        Command::Synthesize(args) => {
            runtime.block_on(commands::stages::synthesize(&config, &store, args))?
        }
        Command::Publish(args) => runtime.block_on(commands::stages::publish(&config, &store, args))?,
        Command::Status => {
            commands::stats::status(&store)?;
            return Ok(true);
        }
    };

    Ok(report.is_success())
}
