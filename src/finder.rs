//! Three-pass duplicate detection.
//!
//! 1. Bucket by size; files with a globally unique size are never hashed.
//! 2. Fingerprint the size-colliders (partial construction for large files)
//!    and bucket by fingerprint.
//! 3. Any candidate group containing a large file is re-hashed in full and
//!    regrouped, eliminating partial-hash false positives.
//!
//! Hashing in passes 2 and 3 is sharded across a rayon pool; grouping stays
//! sequential so the output map does not depend on scheduling.

use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::context::RunContext;
use crate::dir_cache::FileEntry;
use crate::hasher;
use crate::output;
use crate::progress;

/// Fingerprint → members, every group of size ≥ 2. The key is an opaque
/// identifier: a full hash for verified groups, a partial hash otherwise.
pub type DuplicateMap = HashMap<String, Vec<PathBuf>>;

pub fn find_duplicates(files: &mut HashMap<PathBuf, FileEntry>, ctx: &RunContext) -> DuplicateMap {
    // Pass 1: size buckets.
    let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    for (path, entry) in files.iter() {
        by_size.entry(entry.size).or_default().push(path.clone());
    }
    by_size.retain(|_, paths| paths.len() > 1);

    let collisions: Vec<PathBuf> = by_size.into_values().flatten().collect();
    output::info(&format!("size collisions: {} files", collisions.len()));

    // Pass 2: fingerprint the colliders that are not already cached.
    let to_hash: Vec<PathBuf> = collisions
        .iter()
        .filter(|p| files.get(*p).is_some_and(|e| e.fingerprint.is_none()))
        .cloned()
        .collect();
    if !to_hash.is_empty() {
        let bar = progress::create_progress_bar(to_hash.len() as u64, "hashing");
        let hashed: Vec<(PathBuf, Result<String, hasher::HashFailed>)> = to_hash
            .par_iter()
            .map(|path| {
                let result = hasher::hash(path, false, ctx);
                bar.inc(1);
                (path.clone(), result)
            })
            .collect();
        bar.finish_and_clear();

        for (path, result) in hashed {
            match result {
                Ok(fingerprint) => {
                    if let Some(entry) = files.get_mut(&path) {
                        entry.fingerprint = Some(fingerprint);
                    }
                }
                Err(err) => output::warning(&format!("{err}")),
            }
        }
    }

    let mut by_hash: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for path in collisions {
        if let Some(fingerprint) = files.get(&path).and_then(|e| e.fingerprint.clone()) {
            by_hash.entry(fingerprint).or_default().push(path);
        }
    }
    by_hash.retain(|_, paths| paths.len() > 1);

    // Pass 3: full-hash verification for groups touching a large file.
    let mut verified = DuplicateMap::new();
    for (quick_hash, paths) in by_hash {
        // Re-stat at verification time; files deleted since the scan are
        // silently dropped from the large branch.
        let existing: Vec<PathBuf> = paths
            .iter()
            .filter(|p| fs::metadata(p).is_ok())
            .cloned()
            .collect();
        let has_large = existing.iter().any(|p| {
            fs::metadata(p)
                .map(|m| m.len() > ctx.large_file_threshold)
                .unwrap_or(false)
        });
        if !has_large {
            verified.insert(quick_hash, paths);
            continue;
        }

        output::info(&format!("verifying {} large files...", paths.len()));
        let results: Vec<(PathBuf, Result<String, hasher::HashFailed>)> = existing
            .par_iter()
            .map(|path| (path.clone(), hasher::hash(path, true, ctx)))
            .collect();

        let mut by_full: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for (path, result) in results {
            match result {
                Ok(full_hash) => by_full.entry(full_hash).or_default().push(path),
                Err(err) => output::warning(&format!("{err}")),
            }
        }
        for (full_hash, group) in by_full {
            if group.len() > 1 {
                verified.insert(full_hash, group);
            }
        }
    }

    verified
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entry_for(path: &Path) -> (PathBuf, FileEntry) {
        let meta = fs::metadata(path).unwrap();
        let mtime = meta
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        let dir = path.parent().unwrap().to_path_buf();
        (
            path.to_path_buf(),
            FileEntry::new(path.to_path_buf(), dir, meta.len(), mtime),
        )
    }

    fn files_for(paths: &[PathBuf]) -> HashMap<PathBuf, FileEntry> {
        paths.iter().map(|p| entry_for(p)).collect()
    }

    #[test]
    fn unique_sizes_are_never_hashed() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let c = temp.path().join("c");
        fs::write(&a, "1").unwrap();
        fs::write(&b, "22").unwrap();
        fs::write(&c, "333").unwrap();

        let mut files = files_for(&[a, b, c]);
        let ctx = RunContext::default();
        let groups = find_duplicates(&mut files, &ctx);

        assert!(groups.is_empty());
        assert!(files.values().all(|e| e.fingerprint.is_none()));
    }

    #[test]
    fn identical_content_groups_together() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let u = temp.path().join("u");
        fs::write(&a, "duplicate").unwrap();
        fs::write(&b, "duplicate").unwrap();
        fs::write(&u, "unique!!!").unwrap();

        let mut files = files_for(&[a.clone(), b.clone(), u.clone()]);
        let ctx = RunContext::default();
        let groups = find_duplicates(&mut files, &ctx);

        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert_eq!(group.len(), 2);
        assert!(group.contains(&a) && group.contains(&b));
        assert!(!group.contains(&u));
    }

    #[test]
    fn same_size_different_content_is_separated() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "aaaa").unwrap();
        fs::write(&b, "bbbb").unwrap();

        let mut files = files_for(&[a, b]);
        let ctx = RunContext::default();
        assert!(find_duplicates(&mut files, &ctx).is_empty());
    }

    #[test]
    fn cached_fingerprints_are_reused() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();

        let mut files = files_for(&[a.clone(), b.clone()]);
        // Pretend both were fingerprinted on a previous scan.
        for entry in files.values_mut() {
            entry.fingerprint = Some("feedface".to_string());
        }
        let ctx = RunContext::default();
        let groups = find_duplicates(&mut files, &ctx);

        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key("feedface"));
    }

    #[test]
    fn partial_collision_is_caught_by_full_verify() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");

        // 120-byte files agreeing on all three partial segments (offsets 0,
        // 55 and 110 with a 10-byte segment) but differing at bytes 30..40.
        let mut data_a = vec![b'x'; 120];
        data_a[0..10].fill(b'A');
        data_a[55..65].fill(b'M');
        data_a[110..120].fill(b'Z');
        let mut data_b = data_a.clone();
        data_b[30..40].fill(b'y');
        fs::write(&a, &data_a).unwrap();
        fs::write(&b, &data_b).unwrap();

        let ctx = RunContext {
            large_file_threshold: 100,
            partial_hash_size: 10,
            ..RunContext::default()
        };
        let mut files = files_for(&[a, b]);
        let groups = find_duplicates(&mut files, &ctx);

        // Pass 2 groups them by partial hash; pass 3 tells them apart.
        assert!(files.values().all(|e| e.fingerprint.is_some()));
        assert!(groups.is_empty());
    }

    #[test]
    fn verified_groups_are_keyed_by_full_hash() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let data = vec![b'q'; 150];
        fs::write(&a, &data).unwrap();
        fs::write(&b, &data).unwrap();

        let ctx = RunContext {
            large_file_threshold: 100,
            partial_hash_size: 10,
            ..RunContext::default()
        };
        let mut files = files_for(&[a.clone(), b.clone()]);
        let groups = find_duplicates(&mut files, &ctx);

        assert_eq!(groups.len(), 1);
        let (key, group) = groups.iter().next().unwrap();
        assert_eq!(group.len(), 2);
        // The verified key is the full hash, not the partial one.
        assert_ne!(Some(key.as_str()), files[&a].fingerprint.as_deref());
    }
}
