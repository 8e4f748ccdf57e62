//! Per-group resolution.
//!
//! Drives every duplicate group through the appraiser and, when the rules
//! cannot narrow a group to a single keeper, asks the operator. Choices feed
//! back into the appraiser (weights, answers) and into the newdirs ledger so
//! later groups from the same directories can be routed automatically.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::appraiser::Appraiser;
use crate::context::RunContext;
use crate::finder::DuplicateMap;
use crate::output;
use crate::prompt::Prompt;
use crate::utils;

/// Outcome of one interactive round. The reload variant is an explicit
/// discriminant: the caller re-runs the group after the rules re-read
/// instead of unwinding through the prompt loop.
enum Choice {
    Resolved {
        keep: Vec<PathBuf>,
        redundant: Vec<PathBuf>,
    },
    ReloadRules,
}

/// What the operator typed, after validation.
enum Selection {
    RemoveAll,
    KeepAll,
    Reload,
    MoveNew,
    Letter(PathBuf),
    Keep(usize),
}

pub struct Press<'a> {
    ctx: &'a RunContext,
    appraiser: Appraiser<'a>,
    /// source_dir → destinations the operator has moved files to before.
    newdirs: HashMap<PathBuf, BTreeSet<PathBuf>>,
    /// Destinations enabled for automatic reuse this session. Not persisted.
    auto_newdirs: HashSet<PathBuf>,
    pending_moves: HashMap<PathBuf, PathBuf>,
}

impl<'a> Press<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        let mut press = Self {
            ctx,
            appraiser: Appraiser::new(ctx),
            newdirs: HashMap::new(),
            auto_newdirs: HashSet::new(),
            pending_moves: HashMap::new(),
        };
        press.load_newdirs();
        press
    }

    pub fn pending_moves(&self) -> &HashMap<PathBuf, PathBuf> {
        &self.pending_moves
    }

    fn load_newdirs(&mut self) {
        if !self.ctx.resume {
            return;
        }
        let Ok(content) = fs::read_to_string(self.ctx.newdirs_file()) else {
            return;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((source, dest)) = line.split_once(':') {
                self.newdirs
                    .entry(PathBuf::from(source))
                    .or_default()
                    .insert(PathBuf::from(dest));
            }
        }
        output::debug(&format!("loaded {} newdir mappings", self.newdirs.len()));
    }

    fn save_newdir(&mut self, source_dirs: &[PathBuf], dest: &Path) -> Result<()> {
        let path = self.ctx.newdirs_file();
        let mut out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for source in source_dirs {
            let dests = self.newdirs.entry(source.clone()).or_default();
            if dests.insert(dest.to_path_buf()) {
                writeln!(out, "{}:{}", source.display(), dest.display())?;
            }
        }
        Ok(())
    }

    /// Union of recorded destinations over every group member's directory.
    fn suggested_newdirs(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        let mut suggestions = BTreeSet::new();
        for file in files {
            let Some(dir) = utils::to_abs(file).parent().map(Path::to_path_buf) else {
                continue;
            };
            if let Some(dests) = self.newdirs.get(&dir) {
                suggestions.extend(dests.iter().cloned());
            }
        }
        suggestions.into_iter().collect()
    }

    /// Resolve every group, returning the session's redundant list. Groups
    /// are processed in sorted fingerprint order so reruns behave the same.
    pub fn squeeze_redundant(
        &mut self,
        dups: &DuplicateMap,
        prompt: &mut dyn Prompt,
    ) -> Result<Vec<PathBuf>> {
        let mut redundant_files = Vec::new();
        let total = dups.len();
        let bulk = 100;
        let mut window = Instant::now();

        let mut hashes: Vec<&String> = dups.keys().collect();
        hashes.sort();

        for (index, hash) in hashes.into_iter().enumerate() {
            if index > 0 && index % bulk == 0 {
                let elapsed = window.elapsed().as_secs_f64().max(f64::EPSILON);
                window = Instant::now();
                output::info(&format!(
                    "{} groups left, {:.2} groups per second",
                    total - index,
                    bulk as f64 / elapsed
                ));
            }
            let files = &dups[hash];

            loop {
                let (keep, mut redundant) = self.appraiser.decide(files);
                if keep.len() <= 1 {
                    redundant_files.append(&mut redundant);
                    break;
                }

                output::info(&format!("group {index} of {total}"));
                match self.interactive_choose(&keep, prompt)? {
                    Choice::ReloadRules => {
                        self.appraiser.reload_rules();
                        continue;
                    }
                    Choice::Resolved {
                        keep,
                        redundant: chosen,
                    } => {
                        redundant.extend(chosen);
                        for file in &keep {
                            if let Err(err) = self.appraiser.add_from_file(file) {
                                output::warning(&format!("unable to update rules: {err:#}"));
                            }
                        }
                        redundant_files.append(&mut redundant);
                        break;
                    }
                }
            }
        }
        Ok(redundant_files)
    }

    /// Ask the operator which of `files` to keep. Auto-routed destinations
    /// bypass the prompt entirely.
    fn interactive_choose(&mut self, files: &[PathBuf], prompt: &mut dyn Prompt) -> Result<Choice> {
        let suggested = self.suggested_newdirs(files);
        for dest in &suggested {
            if self.auto_newdirs.contains(dest) {
                return self.move_to_new_location(files, Some(dest.clone()), prompt);
            }
        }

        let mut files: Vec<PathBuf> = files.to_vec();
        files.sort();

        output::info("what do you want to keep?");
        output::info("-. remove all");
        output::info("+. leave all");
        output::info("r. reload rules");
        output::info("n. move to new location");

        let mut letters: Vec<(String, PathBuf)> = Vec::new();
        for (i, dest) in suggested.iter().take(26).enumerate() {
            let key = char::from(b'a' + i as u8).to_string();
            output::info(&format!("{key}. move to {}", dest.display()));
            letters.push((key, dest.clone()));
        }
        for (i, file) in files.iter().enumerate() {
            output::info(&format!("{i}. {}", file.display()));
        }

        let selection = loop {
            let answer = prompt.ask("select> ")?.to_lowercase();
            match answer.as_str() {
                "-" => break Selection::RemoveAll,
                "+" => break Selection::KeepAll,
                "r" => break Selection::Reload,
                "n" => break Selection::MoveNew,
                other => {
                    if let Some((_, dest)) = letters.iter().find(|(key, _)| key == other) {
                        break Selection::Letter(dest.clone());
                    }
                    if let Ok(i) = other.parse::<usize>() {
                        if i < files.len() {
                            break Selection::Keep(i);
                        }
                    }
                }
            }
        };

        match selection {
            Selection::RemoveAll => Ok(Choice::Resolved {
                keep: Vec::new(),
                redundant: files,
            }),
            Selection::KeepAll => {
                self.appraiser.save_answer(&files)?;
                Ok(Choice::Resolved {
                    keep: files,
                    redundant: Vec::new(),
                })
            }
            Selection::Reload => Ok(Choice::ReloadRules),
            Selection::MoveNew => self.move_to_new_location(&files, None, prompt),
            Selection::Letter(dest) => {
                self.auto_newdirs.insert(dest.clone());
                output::info(&format!("auto-move enabled for: {}", dest.display()));
                self.move_to_new_location(&files, Some(dest), prompt)
            }
            Selection::Keep(keep_index) => {
                let chosen = files[keep_index].clone();
                let redundant: Vec<PathBuf> = files
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| *i != keep_index)
                    .map(|(_, f)| f)
                    .collect();
                self.appraiser.save_answer(std::slice::from_ref(&chosen))?;
                Ok(Choice::Resolved {
                    keep: vec![chosen],
                    redundant,
                })
            }
        }
    }

    /// Queue one copy for relocation and mark the rest redundant. The
    /// checkpoint may be stale, so the source is the first member that still
    /// exists on disk.
    fn move_to_new_location(
        &mut self,
        files: &[PathBuf],
        dest: Option<PathBuf>,
        prompt: &mut dyn Prompt,
    ) -> Result<Choice> {
        let dest = match dest {
            Some(dest) => dest,
            None => {
                let answer = prompt.ask("new directory> ")?;
                utils::to_abs(&utils::expand_user(answer.trim()))
            }
        };

        let mut source_dirs: Vec<PathBuf> = files
            .iter()
            .filter_map(|f| utils::to_abs(f).parent().map(Path::to_path_buf))
            .collect();
        source_dirs.sort();
        source_dirs.dedup();
        self.save_newdir(&source_dirs, &dest)?;

        let Some(source) = files.iter().find(|f| f.exists()).cloned() else {
            output::warning("no source files exist, skipping");
            return Ok(Choice::Resolved {
                keep: Vec::new(),
                redundant: Vec::new(),
            });
        };
        let Some(name) = source.file_name() else {
            output::warning(&format!("cannot move {}", source.display()));
            return Ok(Choice::Resolved {
                keep: Vec::new(),
                redundant: Vec::new(),
            });
        };

        let new_path = dest.join(name);
        self.pending_moves.insert(source.clone(), new_path.clone());
        output::info(&format!(
            "queued move: {} -> {}",
            source.display(),
            new_path.display()
        ));

        // The destination counts as already selected on the next pass.
        self.appraiser.save_answer(std::slice::from_ref(&new_path))?;

        let redundant = files.iter().filter(|f| **f != source).cloned().collect();
        Ok(Choice::Resolved {
            keep: vec![new_path],
            redundant,
        })
    }
}
