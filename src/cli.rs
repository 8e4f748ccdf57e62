use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::context::RunContext;
use crate::output;
use crate::processor::Processor;
use crate::prompt::StdinPrompt;
use crate::tidy;

#[derive(Parser)]
#[command(name = "dedup")]
#[command(version)]
#[command(about = "Find byte-identical files and interactively resolve them")]
#[command(
    long_about = "Dedup scans directory trees for byte-identical files and walks you \
    through a resumable review that deletes redundant copies (to trash or permanently) \
    or relocates them.\n\n\
    Examples:\n  \
    dedup -d ~/pictures stats            # Print every duplicate group\n  \
    dedup -d ~/pictures dedup            # Review and purge duplicates\n  \
    dedup -d ~/pictures -c dedup         # Continue an interrupted session\n  \
    dedup -d ~/pictures clear-cache      # Drop caches, session state or rules\n  \
    dedup tidy ~/downloads               # Bucket files by modification date"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase output verbosity
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Log every effect without touching the scanned tree
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory root to scan (repeatable)
    #[arg(short = 'd', long = "dirs", global = true, value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// Continue the previous run from its progress and checkpoint files
    #[arg(short = 'c', long = "resume", global = true)]
    pub resume: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan and print every duplicate group
    #[command(visible_alias = "s")]
    Stats,

    /// Scan, resolve interactively, then purge
    Dedup {
        /// Permanently unlink instead of sending to the OS trash
        #[arg(short = 'u', long)]
        unlink: bool,
    },

    /// Clear hash caches, session files, saved answers or rules
    #[command(name = "clear-cache", visible_alias = "clear_cache")]
    ClearCache,

    /// File a directory's contents into YYYY-MM-DD subdirectories
    Tidy {
        /// Directory to organize
        path: PathBuf,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        output::set_verbose(self.verbose);

        // Scan commands cannot run without at least one root.
        if !matches!(self.command, Commands::Tidy { .. }) && self.dirs.is_empty() {
            bail!("missing required option '-d' / '--dirs'");
        }

        let mut ctx = RunContext {
            verbose: self.verbose,
            dry_run: self.dry_run,
            resume: self.resume,
            dirs: self.dirs,
            ..RunContext::default()
        };

        let mut prompt = StdinPrompt;
        match self.command {
            Commands::Stats => Processor::new(&ctx).stats(),
            Commands::Dedup { unlink } => {
                ctx.unlink = unlink;
                Processor::new(&ctx).dedup(&mut prompt)
            }
            Commands::ClearCache => Processor::new(&ctx).clear_cache(&mut prompt),
            Commands::Tidy { path } => {
                if !path.is_dir() {
                    bail!("path must be a directory: {}", path.display());
                }
                tidy::distribute(&path, &ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dirs_is_a_usage_error() {
        let cli = Cli::parse_from(["dedup", "stats"]);
        assert!(cli.run().is_err());
    }

    #[test]
    fn dirs_flag_is_repeatable() {
        let cli = Cli::parse_from(["dedup", "-d", "/a", "-d", "/b", "stats"]);
        assert_eq!(cli.dirs.len(), 2);
    }

    #[test]
    fn dedup_takes_an_unlink_flag() {
        let cli = Cli::parse_from(["dedup", "-d", "/a", "dedup", "-u"]);
        match cli.command {
            Commands::Dedup { unlink } => assert!(unlink),
            _ => panic!("expected dedup subcommand"),
        }
    }

    #[test]
    fn resume_flag_parses() {
        let cli = Cli::parse_from(["dedup", "-d", "/a", "-c", "dedup"]);
        assert!(cli.resume);
    }
}
