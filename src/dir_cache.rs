//! Per-directory stat and fingerprint memo.
//!
//! Each scanned directory owns a `.dedup-meta.cpl` blob mapping the
//! directory's file paths to their last observed size, mtime and (when one
//! was computed) fingerprint. On the next scan, entries whose size and
//! rounded mtime still match are carried forward, so unchanged files are
//! never re-hashed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::artifact;
use crate::context::RunContext;
use crate::output;

const MAGIC: [u8; 4] = *b"DDMC";
const VERSION: u32 = 1;

/// One scanned file. `dir` always equals the owning cache's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub size: u64,
    /// Seconds since the epoch; compared at two-decimal precision.
    pub mtime: f64,
    pub fingerprint: Option<String>,
}

impl FileEntry {
    pub fn new(path: PathBuf, dir: PathBuf, size: u64, mtime: f64) -> Self {
        Self {
            path,
            dir,
            size,
            mtime,
            fingerprint: None,
        }
    }

    /// A cached fingerprint is trusted only while size and rounded mtime
    /// both match the on-disk stat.
    pub fn is_fresh(&self, size: u64, mtime: f64) -> bool {
        self.size == size && round_mtime(self.mtime) == round_mtime(mtime)
    }
}

/// Filesystem mtimes pass through multiple clock and serialization
/// granularities; two decimals is as much as survives a round trip.
pub fn round_mtime(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[derive(Debug)]
pub struct DirCache {
    dir: PathBuf,
    entries: HashMap<PathBuf, FileEntry>,
}

impl DirCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            entries: HashMap::new(),
        }
    }

    /// Load the cache blob for `dir`. A missing file yields an empty cache;
    /// so does a corrupt or unknown-version blob, after a log line.
    pub fn load(dir: &Path) -> Self {
        let mut cache = Self::new(dir);
        let path = RunContext::cache_path(dir);
        match artifact::read::<HashMap<PathBuf, FileEntry>>(&path, MAGIC, VERSION) {
            Ok(Some(entries)) => cache.entries = entries,
            Ok(None) => {}
            Err(err) => output::info(&format!("unable to load {}: {err:#}", path.display())),
        }
        cache
    }

    pub fn store(&self, ctx: &RunContext) -> anyhow::Result<()> {
        if ctx.dry_run {
            return Ok(());
        }
        artifact::write(
            &RunContext::cache_path(&self.dir),
            MAGIC,
            VERSION,
            &self.entries,
        )
    }

    /// Delete the cache blob for `dir`.
    pub fn wipe(dir: &Path, ctx: &RunContext) {
        let path = RunContext::cache_path(dir);
        if !ctx.dry_run && path.exists() {
            if let Err(err) = std::fs::remove_file(&path) {
                output::debug(&format!("unable to delete {}: {err}", path.display()));
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn put(&mut self, path: PathBuf, entry: FileEntry) {
        self.entries.insert(path, entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &FileEntry)> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut FileEntry)> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dir: &Path, name: &str, size: u64, mtime: f64) -> FileEntry {
        FileEntry::new(dir.join(name), dir.to_path_buf(), size, mtime)
    }

    #[test]
    fn store_and_load_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = RunContext::default();

        let mut cache = DirCache::new(temp.path());
        let mut e = entry(temp.path(), "a.txt", 5, 1000.25);
        e.fingerprint = Some("deadbeef".to_string());
        cache.put(e.path.clone(), e.clone());
        cache.store(&ctx).unwrap();

        let loaded = DirCache::load(temp.path());
        assert_eq!(loaded.len(), 1);
        let got = loaded.get(&e.path).unwrap();
        assert_eq!(got.size, 5);
        assert_eq!(got.fingerprint.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn corrupt_blob_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(RunContext::cache_path(temp.path()), b"not a cache").unwrap();

        let loaded = DirCache::load(temp.path());
        assert!(loaded.is_empty());
    }

    #[test]
    fn dry_run_store_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = RunContext {
            dry_run: true,
            ..RunContext::default()
        };

        let mut cache = DirCache::new(temp.path());
        let e = entry(temp.path(), "a.txt", 5, 1000.0);
        cache.put(e.path.clone(), e);
        cache.store(&ctx).unwrap();

        assert!(!RunContext::cache_path(temp.path()).exists());
    }

    #[test]
    fn freshness_tracks_size_and_rounded_mtime() {
        let temp = tempfile::tempdir().unwrap();
        let e = entry(temp.path(), "a.txt", 5, 1000.254);

        assert!(e.is_fresh(5, 1000.2511));
        assert!(!e.is_fresh(6, 1000.254));
        assert!(!e.is_fresh(5, 1000.26));
    }

    #[test]
    fn wipe_removes_the_blob() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = RunContext::default();

        let cache = DirCache::new(temp.path());
        cache.store(&ctx).unwrap();
        assert!(RunContext::cache_path(temp.path()).exists());

        DirCache::wipe(temp.path(), &ctx);
        assert!(!RunContext::cache_path(temp.path()).exists());
    }
}
