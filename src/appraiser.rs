//! Rule-based candidate ranking.
//!
//! Within a duplicate group the appraiser decides which copies to keep:
//! ignore patterns drop paths from consideration entirely, previously
//! confirmed answers win immediately, remove patterns mark copies redundant,
//! and the survivors are ranked by learned directory weights. Every user
//! confirmation feeds back into the weights, so the tool gets quieter run
//! after run.
//!
//! State files are plain UTF-8, one entry per line:
//! - rules:  `<weight>:<abs_dir>`
//! - ignore: `=:<path>` (path or ancestor equals) or `~:<text>` (substring)
//! - remove: `f:<basename>`, `d:<abs_dir>` or `~:<text>`
//! - answers: one absolute path per line

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::output;
use crate::utils;

pub struct Appraiser<'a> {
    ctx: &'a RunContext,
    rules: HashMap<PathBuf, i64>,
    answers: HashSet<PathBuf>,
    ignore_exact: HashSet<PathBuf>,
    ignore_substring: HashSet<String>,
    remove_basename: HashSet<String>,
    remove_dir: HashSet<PathBuf>,
    remove_substring: HashSet<String>,
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl<'a> Appraiser<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        let mut appraiser = Self {
            ctx,
            rules: HashMap::new(),
            answers: HashSet::new(),
            ignore_exact: HashSet::new(),
            ignore_substring: HashSet::new(),
            remove_basename: HashSet::new(),
            remove_dir: HashSet::new(),
            remove_substring: HashSet::new(),
        };
        appraiser.reload_rules();
        appraiser.load_answers();
        appraiser
    }

    /// Re-read rules, ignore and remove lists from disk. Learned state only
    /// applies when continuing a previous run.
    pub fn reload_rules(&mut self) {
        self.rules.clear();
        self.ignore_exact.clear();
        self.ignore_substring.clear();
        self.remove_basename.clear();
        self.remove_dir.clear();
        self.remove_substring.clear();

        if !self.ctx.resume {
            return;
        }

        let rules_file = self.ctx.rules_file();
        output::debug(&format!("read rules from {}", rules_file.display()));
        for line in read_lines(&rules_file) {
            let Some((weight, path)) = line.split_once(':') else {
                continue;
            };
            match weight.parse::<i64>() {
                Ok(weight) => {
                    self.rules.insert(PathBuf::from(path), weight);
                }
                Err(_) => output::debug(&format!("skipping malformed rule: {line}")),
            }
        }

        for line in read_lines(&self.ctx.ignore_file()) {
            let Some((kind, text)) = line.split_once(':') else {
                continue;
            };
            match kind {
                "=" => {
                    self.ignore_exact.insert(PathBuf::from(text));
                }
                "~" => {
                    self.ignore_substring.insert(text.to_string());
                }
                _ => output::debug(&format!("skipping malformed ignore entry: {line}")),
            }
        }

        for line in read_lines(&self.ctx.remove_file()) {
            let Some((kind, text)) = line.split_once(':') else {
                continue;
            };
            match kind {
                "f" => {
                    self.remove_basename.insert(text.to_string());
                }
                "d" => {
                    self.remove_dir.insert(PathBuf::from(text));
                }
                "~" => {
                    self.remove_substring.insert(text.to_string());
                }
                _ => output::debug(&format!("skipping malformed remove entry: {line}")),
            }
        }
    }

    fn load_answers(&mut self) {
        if !self.ctx.resume {
            return;
        }
        self.answers = read_lines(&self.ctx.answers_file())
            .iter()
            .map(|line| utils::to_abs(Path::new(line)))
            .collect();
        output::debug(&format!("loaded {} answers", self.answers.len()));
    }

    /// Sum of rule weights for every rule directory that prefixes the path;
    /// an exact match on the file's own directory counts twice.
    fn calc_weight(&self, path: &Path) -> i64 {
        let parent = path.parent();
        let mut weight = 0;
        for (rule, w) in &self.rules {
            if path.starts_with(rule) {
                weight += w;
            }
            if parent == Some(rule.as_path()) {
                weight += w;
            }
        }
        weight
    }

    /// Ignored paths leave the group entirely: the path itself or any
    /// ancestor matching an exact entry, or any substring pattern matching.
    fn is_ignored(&self, path: &Path) -> bool {
        let rendered = path.to_string_lossy();
        if self
            .ignore_substring
            .iter()
            .any(|pat| rendered.contains(pat.as_str()))
        {
            return true;
        }
        let mut current = Some(path);
        while let Some(p) = current {
            if self.ignore_exact.contains(p) {
                return true;
            }
            current = p.parent();
        }
        false
    }

    fn in_remove(&self, dir: &Path, path: &Path) -> bool {
        if let Some(name) = path.file_name() {
            if self.remove_basename.contains(name.to_string_lossy().as_ref()) {
                return true;
            }
        }
        if self.remove_dir.contains(dir) {
            return true;
        }
        let rendered = path.to_string_lossy();
        self.remove_substring
            .iter()
            .any(|pat| rendered.contains(pat.as_str()))
    }

    /// Bucket survivors by weight. At most one candidate per directory makes
    /// it into the buckets; the rest fall through as redundant. When the
    /// remove filter eliminates everyone, it is undone so a group never ends
    /// up with an empty keep-set.
    fn weight(&self, files: &[PathBuf], filter_removed: bool) -> (BTreeMap<i64, Vec<PathBuf>>, Vec<PathBuf>) {
        let mut weighted: BTreeMap<i64, Vec<PathBuf>> = BTreeMap::new();
        let mut leftovers = Vec::new();
        let mut seen_dirs = HashSet::new();

        for file in files {
            let file = utils::to_abs(file);
            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

            if filter_removed && self.in_remove(&dir, &file) {
                leftovers.push(file);
                continue;
            }
            if !seen_dirs.insert(dir) {
                // Already keeping a copy from this directory.
                leftovers.push(file);
                continue;
            }
            weighted.entry(self.calc_weight(&file)).or_default().push(file);
        }

        if weighted.is_empty() && filter_removed {
            return self.weight(files, false);
        }
        (weighted, leftovers)
    }

    fn already_selected(&self, files: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut selected = Vec::new();
        let mut leftovers = Vec::new();
        let mut seen = HashSet::new();
        for file in files {
            let normalized = utils::to_abs(file);
            if !seen.insert(normalized.clone()) {
                continue;
            }
            if self.answers.contains(&normalized) {
                selected.push(file.clone());
            } else {
                leftovers.push(file.clone());
            }
        }
        (selected, leftovers)
    }

    /// Split a duplicate group into `(keep, redundant)`.
    pub fn decide(&self, files: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let files: Vec<PathBuf> = files
            .iter()
            .filter(|f| !self.is_ignored(f))
            .cloned()
            .collect();
        if files.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let (selected, leftovers) = self.already_selected(&files);
        if !selected.is_empty() {
            return (selected, leftovers);
        }

        let (weighted, mut leftovers) = self.weight(&files, true);
        let mut buckets = weighted.into_iter().rev();
        let selected = buckets.next().map(|(_, paths)| paths).unwrap_or_default();
        for (_, paths) in buckets {
            leftovers.extend(paths);
        }
        (selected, leftovers)
    }

    /// Credit the file's directory with one more point and persist the rule
    /// table (full rewrite, via a temp file).
    pub fn add_from_file(&mut self, file_path: &Path) -> Result<()> {
        let dir = utils::to_abs(file_path.parent().unwrap_or(Path::new("")));
        *self.rules.entry(dir).or_insert(0) += 1;

        let sorted: BTreeMap<&PathBuf, &i64> = self.rules.iter().collect();
        let mut content = String::new();
        for (path, weight) in sorted {
            content.push_str(&format!("{weight}:{}\n", path.display()));
        }

        let path = self.ctx.rules_file();
        let tmp = path.with_file_name(".dedup.rules.list.tmp");
        fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Record paths the user confirmed keeping; appended so an interrupt
    /// loses at most the in-flight line.
    pub fn save_answer(&mut self, files: &[PathBuf]) -> Result<()> {
        let path = self.ctx.answers_file();
        let mut out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for file in files {
            let normalized = utils::to_abs(file);
            if self.answers.insert(normalized.clone()) {
                writeln!(out, "{}", normalized.display())?;
            }
        }
        Ok(())
    }

    pub fn is_answered(&self, path: &Path) -> bool {
        self.answers.contains(&utils::to_abs(path))
    }
}
