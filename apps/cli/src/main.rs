//! seolens CLI — SEO/GEO audit tool.
//!
//! Crawls a target domain, analyzes each page against structural, content,
//! schema, and trust criteria, and streams audit progress to the terminal.

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
