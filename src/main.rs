mod bus;
mod cli;
mod engine;
mod error;
mod logging;
mod model;
mod orchestrator;
mod server;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init();
    cli::run(args).await
}
