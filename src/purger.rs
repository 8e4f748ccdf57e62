//! Applies the session's verdict to the filesystem.
//!
//! After a yes/no/list confirmation: queued moves first, then deletions
//! (trash or unlink), then a prune of directories the deletions emptied.
//! Every filesystem error here is logged and skipped; a half-applied purge
//! can always be finished by a later run.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::dir_cache::DirCache;
use crate::finder::DuplicateMap;
use crate::output;
use crate::progress;
use crate::prompt::Prompt;
use crate::trash_ops;

pub fn purge(
    ctx: &RunContext,
    redundant: &[PathBuf],
    moves: &HashMap<PathBuf, PathBuf>,
    dups: &DuplicateMap,
    prompt: &mut dyn Prompt,
) -> Result<()> {
    let question = format!(
        "do you want to remove {} files and move {} files? yes/no/list> ",
        redundant.len(),
        moves.len()
    );
    loop {
        match prompt.ask(&question)?.as_str() {
            "list" => print_list(redundant, moves, dups),
            "no" => {
                output::info("no changes.");
                return Ok(());
            }
            "yes" => {
                execute_moves(ctx, moves);
                execute_deletions(ctx, redundant);
                prune_empty_dirs(ctx, redundant);
                return Ok(());
            }
            _ => output::info("unknown input"),
        }
    }
}

/// Pending moves, then per group the kept copies against the doomed ones.
fn print_list(redundant: &[PathBuf], moves: &HashMap<PathBuf, PathBuf>, dups: &DuplicateMap) {
    if !moves.is_empty() {
        output::info("=== MOVES ===");
        let sorted: BTreeMap<&PathBuf, &PathBuf> = moves.iter().collect();
        for (src, dst) in sorted {
            output::ok(&format!("{} -> {}", src.display(), dst.display()));
        }
    }

    output::info("=== DELETIONS ===");
    let mut reverse: HashMap<&Path, &str> = HashMap::new();
    for (hash, files) in dups {
        for file in files {
            reverse.insert(file.as_path(), hash.as_str());
        }
    }

    let mut doomed: BTreeMap<&str, BTreeSet<&Path>> = BTreeMap::new();
    for file in redundant {
        if let Some(&hash) = reverse.get(file.as_path()) {
            doomed.entry(hash).or_default().insert(file.as_path());
        }
    }

    for (hash, files) in &doomed {
        let kept: Vec<&PathBuf> = dups[*hash]
            .iter()
            .filter(|f| !files.contains(f.as_path()))
            .collect();
        for keep in kept {
            output::ok(&keep.display().to_string());
        }
        for (index, file) in files.iter().enumerate() {
            output::error(&format!("\t{index:3}. {}", file.display()));
        }
    }
}

fn execute_moves(ctx: &RunContext, moves: &HashMap<PathBuf, PathBuf>) {
    let sorted: BTreeMap<&PathBuf, &PathBuf> = moves.iter().collect();
    for (src, dst) in sorted {
        if !src.exists() {
            output::warning(&format!("source not found, skipping: {}", src.display()));
            continue;
        }
        if ctx.dry_run {
            output::info(&format!(
                "dry-run: would move {} -> {}",
                src.display(),
                dst.display()
            ));
            continue;
        }
        if let Err(err) = move_file(src, dst) {
            output::warning(&format!(
                "unable to move {} -> {}: {err}",
                src.display(),
                dst.display()
            ));
            continue;
        }
        output::ok(&format!("moved {} -> {}", src.display(), dst.display()));
    }
}

/// Rename, materializing the destination directory; falls back to
/// copy-then-unlink for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}

fn execute_deletions(ctx: &RunContext, redundant: &[PathBuf]) {
    let bar = progress::create_progress_bar(redundant.len() as u64, "deleting");
    let mut reclaimed = 0u64;
    for file in redundant {
        bar.inc(1);
        let Ok(meta) = fs::metadata(file) else {
            // Already gone; nothing to do.
            continue;
        };
        if ctx.dry_run {
            output::debug(&format!("dry-run: would delete {}", file.display()));
            reclaimed += meta.len();
            continue;
        }
        match trash_ops::delete(file, ctx.unlink) {
            Ok(()) => reclaimed += meta.len(),
            Err(err) => output::debug(&format!("unable to delete file {}: {err:#}", file.display())),
        }
    }
    bar.finish_and_clear();

    let amount = bytesize::to_string(reclaimed, true);
    if ctx.dry_run {
        output::info(&format!("dry-run: would reclaim {amount}"));
    } else {
        output::ok(&format!("reclaimed {amount}"));
    }
}

/// Deepest-first sweep over the parents of every deleted file: drop their
/// cache blobs and rmdir the ones left empty. A permission failure gets one
/// retry after clearing the readonly bit.
fn prune_empty_dirs(ctx: &RunContext, redundant: &[PathBuf]) {
    let parents: BTreeSet<PathBuf> = redundant
        .iter()
        .filter_map(|f| f.parent().map(Path::to_path_buf))
        .collect();
    let mut parents: Vec<PathBuf> = parents.into_iter().collect();
    parents.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    for dir in parents {
        DirCache::wipe(&dir, ctx);
        if !dir.exists() {
            continue;
        }
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        if ctx.dry_run {
            output::info(&format!(
                "dry-run: would remove empty directory {}",
                dir.display()
            ));
            continue;
        }
        if let Err(err) = fs::remove_dir(&dir) {
            if err.kind() == io::ErrorKind::PermissionDenied {
                make_writable(&dir);
                if let Err(err) = fs::remove_dir(&dir) {
                    output::warning(&format!("unable to remove {}: {err}", dir.display()));
                }
            } else {
                output::warning(&format!("unable to remove {}: {err}", dir.display()));
            }
        }
    }
}

fn make_writable(dir: &Path) {
    if let Ok(meta) = fs::metadata(dir) {
        let mut perms = meta.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        let _ = fs::set_permissions(dir, perms);
    }
}
