//! Filesystem traversal and per-directory cache reconciliation.
//!
//! The walker only collects stat data (size, mtime); fingerprints are
//! computed later, and only for files whose size collides. Each visited
//! directory is reconciled against its cache blob, and directories whose
//! cache was committed are appended to the progress file so an interrupted
//! scan can resume without re-statting them.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::context::{RunContext, CACHE_FILENAME};
use crate::dir_cache::{DirCache, FileEntry};
use crate::output;
use crate::utils;

/// Append-as-you-go record of directories whose cache has been committed.
pub struct ProgressLog {
    done: HashSet<PathBuf>,
    file: fs::File,
}

impl ProgressLog {
    /// Resume mode loads the previously committed set and appends; a fresh
    /// run truncates.
    pub fn open(ctx: &RunContext) -> Result<Self> {
        let path = ctx.progress_file();
        let mut done = HashSet::new();
        if ctx.resume {
            output::info(&format!("using progress file {}", path.display()));
            if let Ok(content) = fs::read_to_string(&path) {
                done = content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| utils::to_abs(Path::new(line.trim())))
                    .collect();
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Self { done, file })
        } else {
            let file = fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self { done, file })
        }
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.done.contains(dir)
    }

    /// Flushes immediately so the record survives an interrupt.
    pub fn record(&mut self, dir: &Path) -> std::io::Result<()> {
        writeln!(self.file, "{}", dir.display())?;
        self.file.flush()?;
        self.done.insert(dir.to_path_buf());
        Ok(())
    }
}

pub struct Walker<'a> {
    ctx: &'a RunContext,
}

impl<'a> Walker<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Non-hidden directories under `root`, depth-first, root first.
    pub fn directories(root: &Path) -> Vec<PathBuf> {
        let root = utils::to_abs(root);
        WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.file_type().is_dir() && (e.depth() == 0 || !utils::is_hidden_name(e.file_name()))
            })
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .collect()
    }

    /// Walk `root`, returning every scanned file plus the per-directory
    /// caches they were reconciled into.
    pub fn build(
        &self,
        root: &Path,
        progress: &mut ProgressLog,
    ) -> Result<(HashMap<PathBuf, FileEntry>, HashMap<PathBuf, DirCache>)> {
        let mut files = HashMap::new();
        let mut dirs = HashMap::new();

        let root = utils::to_abs(root);
        output::info(&format!("reading file system {}", root.display()));

        for dir in Self::directories(&root) {
            let old = DirCache::load(&dir);

            // A directory already committed in this session's progress file
            // is adopted wholesale: its stat work is done.
            if self.ctx.resume && !old.is_empty() && progress.contains(&dir) {
                output::warning(&format!("cached: {}", dir.display()));
                for (path, entry) in old.entries() {
                    files.insert(path.clone(), entry.clone());
                }
                dirs.insert(dir, old);
                continue;
            }

            output::ok(&format!("mapping {}", dir.display()));
            let (fresh, changed, exception) = self.reconcile(&dir, &old);

            for (path, entry) in fresh.entries() {
                files.insert(path.clone(), entry.clone());
            }

            if changed && !exception {
                progress
                    .record(&dir)
                    .with_context(|| format!("failed to record progress for {}", dir.display()))?;
                if let Err(err) = fresh.store(self.ctx) {
                    output::warning(&format!("unable to store cache for {}: {err:#}", dir.display()));
                }
            }
            dirs.insert(dir, fresh);
        }

        Ok((files, dirs))
    }

    /// Stat every file in `dir`, carrying forward cached entries that are
    /// still fresh. A stat failure marks the directory as "exception": its
    /// progress line is withheld so the next run rescans it, but the files
    /// that did stat are still emitted.
    fn reconcile(&self, dir: &Path, old: &DirCache) -> (DirCache, bool, bool) {
        let mut fresh = DirCache::new(dir);
        let mut changed = false;
        let mut exception = false;

        let reader = match fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(err) => {
                output::warning(&format!("unable to read {}: {err}", dir.display()));
                return (fresh, false, true);
            }
        };

        for entry in reader {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    output::warning(&format!("unable to read entry in {}: {err}", dir.display()));
                    exception = true;
                    continue;
                }
            };
            if entry.file_name() == CACHE_FILENAME {
                continue;
            }
            let path = dir.join(entry.file_name());

            // Follows symlinks; subdirectories are handled by the walk.
            let meta = match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(err) => {
                    output::warning(&format!("unable to stat file {}: {err}", path.display()));
                    exception = true;
                    continue;
                }
            };
            let size = meta.len();
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);

            let entry = match old.get(&path) {
                Some(cached) if cached.is_fresh(size, mtime) => {
                    // Carried forward; still counts as a change until its
                    // fingerprint has made it to disk.
                    changed |= cached.fingerprint.is_none();
                    let mut carried = cached.clone();
                    carried.size = size;
                    carried.mtime = mtime;
                    carried
                }
                _ => {
                    changed = true;
                    FileEntry::new(path.clone(), dir.to_path_buf(), size, mtime)
                }
            };
            fresh.put(path, entry);
        }

        (fresh, changed, exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Session files live next to the scanned tree, not inside it.
    fn fixture() -> (TempDir, RunContext, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        let ctx = RunContext {
            work_dir: temp.path().to_path_buf(),
            ..RunContext::default()
        };
        (temp, ctx, data)
    }

    #[test]
    fn collects_stat_but_no_fingerprints() {
        let (_temp, ctx, data) = fixture();
        fs::write(data.join("a.txt"), "alpha").unwrap();
        fs::write(data.join("b.txt"), "bravo").unwrap();

        let mut progress = ProgressLog::open(&ctx).unwrap();
        let (files, dirs) = Walker::new(&ctx).build(&data, &mut progress).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.values().all(|e| e.fingerprint.is_none()));
        assert!(files.values().all(|e| e.size == 5));
        assert_eq!(dirs.len(), 1);
    }

    #[test]
    fn hidden_directories_are_pruned() {
        let (_temp, ctx, data) = fixture();
        let hidden = data.join(".secret");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("x.txt"), "x").unwrap();
        fs::write(data.join("y.txt"), "y").unwrap();

        let mut progress = ProgressLog::open(&ctx).unwrap();
        let (files, _) = Walker::new(&ctx).build(&data, &mut progress).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files.keys().all(|p| !p.to_string_lossy().contains(".secret")));
    }

    #[test]
    fn cache_file_itself_is_skipped() {
        let (_temp, ctx, data) = fixture();
        fs::write(data.join("a.txt"), "alpha").unwrap();

        {
            let mut progress = ProgressLog::open(&ctx).unwrap();
            Walker::new(&ctx).build(&data, &mut progress).unwrap();
        }
        assert!(RunContext::cache_path(&data).exists());

        let mut progress = ProgressLog::open(&ctx).unwrap();
        let (files, _) = Walker::new(&ctx).build(&data, &mut progress).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn progress_file_lists_committed_directories() {
        let (_temp, ctx, data) = fixture();
        let sub = data.join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.txt"), "alpha").unwrap();

        let mut progress = ProgressLog::open(&ctx).unwrap();
        Walker::new(&ctx).build(&data, &mut progress).unwrap();

        let content = fs::read_to_string(ctx.progress_file()).unwrap();
        let canon_sub = fs::canonicalize(&sub).unwrap();
        assert!(content.lines().any(|l| Path::new(l) == canon_sub));
    }

    #[test]
    fn resume_adopts_committed_directories() {
        let (_temp, ctx, data) = fixture();
        fs::write(data.join("a.txt"), "alpha").unwrap();

        {
            let mut progress = ProgressLog::open(&ctx).unwrap();
            Walker::new(&ctx).build(&data, &mut progress).unwrap();
        }

        let resume_ctx = RunContext {
            resume: true,
            ..ctx.clone()
        };
        let mut progress = ProgressLog::open(&resume_ctx).unwrap();
        let (files, _) = Walker::new(&resume_ctx).build(&data, &mut progress).unwrap();
        assert_eq!(files.len(), 1);
    }

    fn seed_fingerprints(ctx: &RunContext, data: &Path, fingerprint: &str) {
        let canon = fs::canonicalize(data).unwrap();
        let mut progress = ProgressLog::open(ctx).unwrap();
        let (_, mut dirs) = Walker::new(ctx).build(data, &mut progress).unwrap();
        let cache = dirs.get_mut(&canon).unwrap();
        for (_, entry) in cache.entries_mut() {
            entry.fingerprint = Some(fingerprint.to_string());
        }
        cache.store(ctx).unwrap();
    }

    #[test]
    fn fresh_cached_entries_are_carried_forward() {
        let (_temp, ctx, data) = fixture();
        fs::write(data.join("a.txt"), "alpha").unwrap();
        seed_fingerprints(&ctx, &data, "cafe");

        let mut progress = ProgressLog::open(&ctx).unwrap();
        let (files, _) = Walker::new(&ctx).build(&data, &mut progress).unwrap();
        assert!(files.values().all(|e| e.fingerprint.as_deref() == Some("cafe")));
    }

    #[test]
    fn stale_cached_fingerprint_is_dropped() {
        let (_temp, ctx, data) = fixture();
        let file = data.join("a.txt");
        fs::write(&file, "alpha").unwrap();
        seed_fingerprints(&ctx, &data, "cafe");

        // Different size invalidates the entry.
        fs::write(&file, "alphabet").unwrap();

        let mut progress = ProgressLog::open(&ctx).unwrap();
        let (files, _) = Walker::new(&ctx).build(&data, &mut progress).unwrap();
        assert!(files.values().all(|e| e.fingerprint.is_none()));
        assert!(files.values().all(|e| e.size == 8));
    }
}
