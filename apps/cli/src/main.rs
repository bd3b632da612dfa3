//! LeadScout CLI: contact enrichment for farm report leads.
//!
//! Splits a farm report into borrowers and lenders, looks each person up in
//! people-search sources and writes enriched CSVs plus a run summary.

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
