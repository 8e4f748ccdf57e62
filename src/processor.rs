//! Command orchestration.
//!
//! Wires the pipeline together: walk → find duplicates → checkpoint →
//! resolve → checkpoint → purge, with each checkpoint loaded instead of
//! recomputed when continuing a previous run.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::checkpoint;
use crate::context::RunContext;
use crate::dir_cache::{DirCache, FileEntry};
use crate::finder::{self, DuplicateMap};
use crate::output;
use crate::press::Press;
use crate::prompt::Prompt;
use crate::purger;
use crate::walker::{ProgressLog, Walker};

pub struct Processor<'a> {
    ctx: &'a RunContext,
}

impl<'a> Processor<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Scan every configured root and compute the duplicate map.
    pub fn calculus(&self) -> Result<(HashMap<PathBuf, FileEntry>, DuplicateMap)> {
        let mut files = HashMap::new();
        let mut dirs: HashMap<PathBuf, DirCache> = HashMap::new();

        let mut progress = ProgressLog::open(self.ctx)?;
        let walker = Walker::new(self.ctx);
        for root in &self.ctx.dirs {
            let (walked_files, walked_dirs) = walker.build(root, &mut progress)?;
            files.extend(walked_files);
            dirs.extend(walked_dirs);
        }

        let dups = finder::find_duplicates(&mut files, self.ctx);

        // Fingerprints computed during the passes go back into the caches so
        // the next unchanged scan hashes nothing.
        self.persist_fingerprints(&files, &mut dirs);

        Ok((files, dups))
    }

    fn persist_fingerprints(
        &self,
        files: &HashMap<PathBuf, FileEntry>,
        dirs: &mut HashMap<PathBuf, DirCache>,
    ) {
        for cache in dirs.values_mut() {
            let mut changed = false;
            for (path, entry) in cache.entries_mut() {
                if entry.fingerprint.is_some() {
                    continue;
                }
                if let Some(fingerprint) = files.get(path).and_then(|e| e.fingerprint.as_ref()) {
                    entry.fingerprint = Some(fingerprint.clone());
                    changed = true;
                }
            }
            if changed {
                if let Err(err) = cache.store(self.ctx) {
                    output::warning(&format!(
                        "unable to store cache for {}: {err:#}",
                        cache.dir().display()
                    ));
                }
            }
        }
    }

    /// Print every duplicate group.
    pub fn stats(&self) -> Result<()> {
        let (_files, dups) = self.calculus()?;
        let mut hashes: Vec<&String> = dups.keys().collect();
        hashes.sort();
        for hash in hashes {
            output::info(hash);
            let mut members = dups[hash].clone();
            members.sort();
            for file in members {
                output::info(&format!("\t{}", file.display()));
            }
        }
        Ok(())
    }

    /// The full interactive session.
    pub fn dedup(&self, prompt: &mut dyn Prompt) -> Result<()> {
        let loaded = if self.ctx.resume {
            checkpoint::load_groups(self.ctx)
        } else {
            None
        };
        let dups = match loaded {
            Some(dups) => dups,
            None => {
                let (_files, dups) = self.calculus()?;
                if dups.is_empty() {
                    output::info("no duplicates");
                    return Ok(());
                }
                checkpoint::save_groups(self.ctx, &dups)?;
                dups
            }
        };

        let loaded = if self.ctx.resume {
            checkpoint::load_redundant(self.ctx)
        } else {
            None
        };
        let (redundant, moves) = match loaded {
            Some(redundant) => {
                let moves = checkpoint::load_moves(self.ctx).unwrap_or_default();
                (redundant, moves)
            }
            None => {
                let mut press = Press::new(self.ctx);
                let redundant = press.squeeze_redundant(&dups, prompt)?;
                let moves = press.pending_moves().clone();
                checkpoint::save_redundant(self.ctx, &redundant)?;
                checkpoint::save_moves(self.ctx, &moves)?;
                (redundant, moves)
            }
        };

        output::info(&format!(
            "processing: {} deletions, {} moves",
            redundant.len(),
            moves.len()
        ));
        purger::purge(self.ctx, &redundant, &moves, &dups, prompt)
    }

    /// Interactive menu clearing any combination of persisted state.
    pub fn clear_cache(&self, prompt: &mut dyn Prompt) -> Result<()> {
        output::info(
            "\nWhat do you want to clear?\n  \
             1. Hash cache      - .dedup-meta.cpl files in scanned directories\n  \
             2. Session files   - checkpoint, final_redundant, pending_moves, progress\n  \
             3. Saved answers   - answers, newdirs\n  \
             4. Rules           - rules, ignore, remove lists\n  \
             5. All of the above\n  \
             q. Cancel\n",
        );

        let answer = prompt.ask("choice> ")?.to_lowercase();
        if answer == "q" {
            output::info("cancelled");
            return Ok(());
        }

        let mut choices: Vec<&str> = answer.split([',', ' ']).filter(|s| !s.is_empty()).collect();
        if choices.contains(&"5") {
            choices = vec!["1", "2", "3", "4"];
        }

        if choices.contains(&"1") {
            output::info("clearing hash cache...");
            for root in &self.ctx.dirs {
                for dir in Walker::directories(root) {
                    DirCache::wipe(&dir, self.ctx);
                }
            }
            output::ok("hash cache cleared");
        }
        if choices.contains(&"2") {
            output::info("clearing session files...");
            for file in [
                self.ctx.checkpoint_file(),
                self.ctx.final_redundant_file(),
                self.ctx.pending_moves_file(),
                self.ctx.progress_file(),
            ] {
                remove_state_file(&file);
            }
        }
        if choices.contains(&"3") {
            output::info("clearing saved answers...");
            for file in [self.ctx.answers_file(), self.ctx.newdirs_file()] {
                remove_state_file(&file);
            }
        }
        if choices.contains(&"4") {
            output::info("clearing rules...");
            for file in [
                self.ctx.rules_file(),
                self.ctx.ignore_file(),
                self.ctx.remove_file(),
            ] {
                remove_state_file(&file);
            }
        }
        Ok(())
    }
}

fn remove_state_file(path: &std::path::Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => output::ok(&format!("removed {}", path.display())),
        Err(err) => output::warning(&format!("unable to remove {}: {err}", path.display())),
    }
}
