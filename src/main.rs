mod aggregate;
mod archive;
mod auth;
mod cli;
mod config;
mod error;
mod event;
mod locator;
mod pipeline;
mod report;
mod reporter;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting reportetl - nightly test-report ETL");
    cli.execute().await?;

    Ok(())
}
