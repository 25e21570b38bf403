//! kbsift CLI: knowledge-base artifacts from link corpora.
//!
//! Each subcommand runs one dataflow job over JSON-lines input and writes
//! partitioned JSON-lines output with a run manifest.

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
