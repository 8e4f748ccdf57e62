//! Run configuration threaded through every component constructor.

use std::path::{Path, PathBuf};

/// Per-directory cache file name. Starts with a dot so hidden-directory
/// pruning never descends into anything named after it, and the walker skips
/// it by name inside visited directories.
pub const CACHE_FILENAME: &str = ".dedup-meta.cpl";

/// Session-wide settings and file locations.
///
/// Session bookkeeping (progress, checkpoints, learned rules) lives under
/// `work_dir`, which defaults to the current directory.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub verbose: bool,
    pub dry_run: bool,
    /// Continue the previous run: reuse progress, checkpoints and learned
    /// rules instead of starting fresh.
    pub resume: bool,
    /// Permanently unlink instead of sending to the OS trash.
    pub unlink: bool,
    pub dirs: Vec<PathBuf>,
    pub work_dir: PathBuf,

    /// Files above this size get the three-segment partial fingerprint in
    /// the candidate-narrowing pass.
    pub large_file_threshold: u64,
    /// Bytes hashed per segment of the partial fingerprint.
    pub partial_hash_size: u64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            verbose: false,
            dry_run: false,
            resume: false,
            unlink: false,
            dirs: Vec::new(),
            work_dir: PathBuf::from("."),
            large_file_threshold: 100 * 1024 * 1024,
            partial_hash_size: 10 * 1024 * 1024,
        }
    }
}

impl RunContext {
    fn session_file(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// Directories whose cache was committed during the current scan.
    pub fn progress_file(&self) -> PathBuf {
        self.session_file(".dedup.progress")
    }

    pub fn rules_file(&self) -> PathBuf {
        self.session_file(".dedup.rules.list")
    }

    pub fn ignore_file(&self) -> PathBuf {
        self.session_file(".dedup.ignore.list")
    }

    pub fn remove_file(&self) -> PathBuf {
        self.session_file(".dedup.remove.list")
    }

    pub fn answers_file(&self) -> PathBuf {
        self.session_file(".dedup.answers.list")
    }

    pub fn newdirs_file(&self) -> PathBuf {
        self.session_file(".dedup.newdirs.list")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.session_file(".dedup.checkpoint")
    }

    pub fn final_redundant_file(&self) -> PathBuf {
        self.session_file(".dedup.final_redundant")
    }

    pub fn pending_moves_file(&self) -> PathBuf {
        self.session_file(".dedup.pending_moves")
    }

    pub fn cache_path(dir: &Path) -> PathBuf {
        dir.join(CACHE_FILENAME)
    }
}
