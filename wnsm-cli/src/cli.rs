mod account;
mod burrow;
mod db;
mod import;

use clap::{Parser, Subcommand};

use crate::cli::{burrow::BurrowArgs, import::ImportArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import the movement data into the hourly statistics.
    #[clap(name = "import")]
    Import(Box<ImportArgs>),

    /// Development tools: call the portal and print the responses.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}
