//! LobGraph CLI: invitation-graph scraper and exporter for a Lobsters-style forum.
//!
//! Imports the public invitation tree, scrapes member profiles, enriches them
//! through a people-search API and exports JSON for the graph viewer.

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
