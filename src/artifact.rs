//! Versioned binary blobs.
//!
//! Every on-disk binary artifact (per-directory caches, session checkpoints)
//! is framed as `magic (4 bytes) | version (u32 LE) | bincode payload`.
//! Readers reject unknown magic or versions with an error so callers can log
//! and fall back to an empty state instead of misreading stale formats.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

const HEADER_LEN: usize = 8;

pub fn write<T: Serialize>(path: &Path, magic: [u8; 4], version: u32, value: &T) -> Result<()> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 128);
    buf.extend_from_slice(&magic);
    buf.extend_from_slice(&version.to_le_bytes());
    bincode::serialize_into(&mut buf, value)
        .with_context(|| format!("failed to encode {}", path.display()))?;

    // Write-then-rename so a crash never leaves a truncated artifact behind.
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp, &buf).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Returns `Ok(None)` when the file does not exist; corrupt or unknown
/// framing is an error for the caller to log.
pub fn read<T: DeserializeOwned>(path: &Path, magic: [u8; 4], version: u32) -> Result<Option<T>> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };

    if buf.len() < HEADER_LEN || buf[..4] != magic {
        bail!("{}: unrecognized file format", path.display());
    }
    let found = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if found != version {
        bail!("{}: unsupported version {found}", path.display());
    }

    let value = bincode::deserialize(&buf[HEADER_LEN..])
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MAGIC: [u8; 4] = *b"TSTA";

    #[test]
    fn roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        let value: HashMap<String, u64> = [("a".to_string(), 1u64)].into_iter().collect();

        write(&path, MAGIC, 1, &value).unwrap();
        let loaded: HashMap<String, u64> = read(&path, MAGIC, 1).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_file_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let loaded: Option<u64> = read(&temp.path().join("absent"), MAGIC, 1).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn wrong_magic_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        write(&path, MAGIC, 1, &42u64).unwrap();

        let loaded: Result<Option<u64>> = read(&path, *b"OTHR", 1);
        assert!(loaded.is_err());
    }

    #[test]
    fn newer_version_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        write(&path, MAGIC, 2, &42u64).unwrap();

        let loaded: Result<Option<u64>> = read(&path, MAGIC, 1);
        assert!(loaded.is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        std::fs::write(&path, b"xy").unwrap();

        let loaded: Result<Option<u64>> = read(&path, MAGIC, 1);
        assert!(loaded.is_err());
    }
}
