//! Date-bucketing sidecar.
//!
//! `tidy PATH` files the direct children of a directory into `YYYY-MM-DD`
//! subdirectories by modification date. Subdirectories are left alone.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::output;

pub fn distribute(dir: &Path, ctx: &RunContext) -> Result<()> {
    let mut buckets: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let stamp: DateTime<Local> = modified.into();
        let bucket = dir.join(stamp.format("%Y-%m-%d").to_string());
        buckets.entry(bucket).or_default().push(path);
    }

    for (bucket, files) in buckets {
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = bucket.join(name);
            output::info(&format!("{} -> {}", file.display(), target.display()));
            if !ctx.dry_run {
                fs::create_dir_all(&bucket)
                    .with_context(|| format!("failed to create {}", bucket.display()))?;
                fs::rename(&file, &target)
                    .with_context(|| format!("failed to move {}", file.display()))?;
            }
        }
    }
    Ok(())
}
