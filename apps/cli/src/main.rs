//! Tiercast CLI: build, inspect and query adaptive routing specs.
//!
//! Runs the production pipeline into a routing spec, and answers
//! classify / select / degrade queries against a compiled one.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
