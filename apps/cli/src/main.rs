//! sitepdf CLI: documentation site to PDF.
//!
//! Extracts an ordered page list from a navigation menu, renders each page
//! with headless Chrome and wkhtmltopdf, and merges the results in order.

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
