//! Session checkpoints.
//!
//! Three durable write points make the interactive session crash-safe: the
//! detected duplicate map after the scan, and the redundant list plus the
//! pending-move map after resolution. In resume mode each artifact is loaded
//! in place of re-running the stage that produced it; a missing or corrupt
//! artifact drops back to fresh execution.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::artifact;
use crate::context::RunContext;
use crate::finder::DuplicateMap;
use crate::output;

const GROUPS_MAGIC: [u8; 4] = *b"DDCK";
const REDUNDANT_MAGIC: [u8; 4] = *b"DDRD";
const MOVES_MAGIC: [u8; 4] = *b"DDMV";
const VERSION: u32 = 1;

pub fn save_groups(ctx: &RunContext, groups: &DuplicateMap) -> Result<()> {
    artifact::write(&ctx.checkpoint_file(), GROUPS_MAGIC, VERSION, groups)
}

pub fn load_groups(ctx: &RunContext) -> Option<DuplicateMap> {
    read_or_warn(artifact::read(&ctx.checkpoint_file(), GROUPS_MAGIC, VERSION))
}

pub fn save_redundant(ctx: &RunContext, redundant: &Vec<PathBuf>) -> Result<()> {
    artifact::write(
        &ctx.final_redundant_file(),
        REDUNDANT_MAGIC,
        VERSION,
        redundant,
    )
}

pub fn load_redundant(ctx: &RunContext) -> Option<Vec<PathBuf>> {
    read_or_warn(artifact::read(
        &ctx.final_redundant_file(),
        REDUNDANT_MAGIC,
        VERSION,
    ))
}

pub fn save_moves(ctx: &RunContext, moves: &HashMap<PathBuf, PathBuf>) -> Result<()> {
    artifact::write(&ctx.pending_moves_file(), MOVES_MAGIC, VERSION, moves)
}

pub fn load_moves(ctx: &RunContext) -> Option<HashMap<PathBuf, PathBuf>> {
    read_or_warn(artifact::read(
        &ctx.pending_moves_file(),
        MOVES_MAGIC,
        VERSION,
    ))
}

fn read_or_warn<T>(result: Result<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            output::warning(&format!("ignoring unreadable checkpoint: {err:#}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (tempfile::TempDir, RunContext) {
        let temp = tempfile::tempdir().unwrap();
        let ctx = RunContext {
            work_dir: temp.path().to_path_buf(),
            ..RunContext::default()
        };
        (temp, ctx)
    }

    #[test]
    fn groups_roundtrip() {
        let (_temp, ctx) = ctx();
        let mut groups = DuplicateMap::new();
        groups.insert(
            "abc".to_string(),
            vec![PathBuf::from("/a/x"), PathBuf::from("/b/x")],
        );

        save_groups(&ctx, &groups).unwrap();
        assert_eq!(load_groups(&ctx), Some(groups));
    }

    #[test]
    fn absent_artifacts_load_as_none() {
        let (_temp, ctx) = ctx();
        assert!(load_groups(&ctx).is_none());
        assert!(load_redundant(&ctx).is_none());
        assert!(load_moves(&ctx).is_none());
    }

    #[test]
    fn corrupt_artifact_loads_as_none() {
        let (_temp, ctx) = ctx();
        std::fs::write(ctx.checkpoint_file(), b"garbage").unwrap();
        assert!(load_groups(&ctx).is_none());
    }

    #[test]
    fn redundant_and_moves_roundtrip() {
        let (_temp, ctx) = ctx();
        let redundant = vec![PathBuf::from("/a/x")];
        let moves: HashMap<PathBuf, PathBuf> =
            [(PathBuf::from("/a/x"), PathBuf::from("/new/x"))]
                .into_iter()
                .collect();

        save_redundant(&ctx, &redundant).unwrap();
        save_moves(&ctx, &moves).unwrap();
        assert_eq!(load_redundant(&ctx), Some(redundant));
        assert_eq!(load_moves(&ctx), Some(moves));
    }
}
