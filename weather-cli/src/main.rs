//! Binary crate for the `weather-ingest` job.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Installing the logger
//! - Wiring real stores into the core ingestion routine

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
