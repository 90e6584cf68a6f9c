use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

fn main() -> Result<()> {
    let parsed = cli::Cli::parse();
    parsed.dispatch()
}
