//! Command line interface for the tome catalog engine.

mod app;
mod cli;
mod commands;
mod logging;

use clap::Parser;
use tome_config::Config;

use crate::app::{App, report};
use crate::cli::Cli;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    logging::init(&config.logging.level, cli.verbose)?;
    let app = App::open(config).await?;
    commands::run(app, cli.command).await
}
