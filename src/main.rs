use anyhow::Result;
use clap::Parser;
use dedup::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}
