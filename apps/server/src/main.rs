//! SEO Forge server: keyword ranking analysis and SEO content generation
//! behind a small HTTP API.

mod commands;
mod error;
mod routes;
mod state;

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
