#![allow(unused)]

use crate::prelude::*;
use clap::Parser;

mod config;
mod error;
mod extract;
mod layout;
mod model;
mod normalizer;
mod orchestrator;
mod pipeline;
mod prelude;
mod tables;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Extract procurement line items from RFQs, material take-offs and purchase orders"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Pipeline configuration file (TOML)
    #[clap(long, env = "TAKEOFF_CONFIG", global = true)]
    config: Option<std::path::PathBuf>,

    /// Whether to display additional information.
    #[clap(long, env = "TAKEOFF_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Extract normalized line items from a document
    Extract(crate::extract::ExtractOptions),

    /// Score and rank the tables of a layout-analysis JSON file
    Tables(crate::tables::TablesOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Extract(options) => crate::extract::run(options, app.global).await,
        SubCommands::Tables(options) => crate::tables::run(options, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
