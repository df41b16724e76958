#![doc = include_str!("../README.md")]

mod config;
mod driver;
mod telemetry;

use anyhow::bail;
use clap::Parser;
use config::{CliArgs, LoadConfig};
use telemetry::init_tracing;

// Workers allocate from many threads at once.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoadConfig::try_from(args)?;

    init_tracing();
    log_startup_info(&config);

    let report = driver::run(&config)?;
    print!("{report}");

    if !report.terminated {
        bail!(
            "executor did not terminate within {:?}",
            config.shutdown_timeout
        );
    }
    Ok(())
}

fn log_startup_info(config: &LoadConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting load run with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting load run: {} tasks over {} stripes ({:?} routing)",
            config.tasks,
            config.striped.stripes,
            config.routing
        );
    }
}
