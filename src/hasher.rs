//! Content fingerprints.
//!
//! Two MD5 constructions: a full-stream hash, and a three-segment partial
//! hash (prefix, middle, suffix) for files over the large-file threshold.
//! The two live in distinct namespaces by file-size class and are never
//! compared with each other; the finder's verification pass re-hashes any
//! candidate group containing a large file with the full construction.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::context::RunContext;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
#[error("unable to hash {}: {source}", path.display())]
pub struct HashFailed {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Fingerprint a file. `full` forces the full construction; otherwise files
/// over `ctx.large_file_threshold` get the partial one.
pub fn hash(path: &Path, full: bool, ctx: &RunContext) -> Result<String, HashFailed> {
    let run = || -> io::Result<String> {
        let size = std::fs::metadata(path)?.len();
        if full || size <= ctx.large_file_threshold {
            hash_full(path)
        } else {
            hash_partial(path, size, ctx.partial_hash_size)
        }
    };
    run().map_err(|source| HashFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn hash_full(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash prefix + middle + suffix segments with a single digest.
///
/// Offsets are 0, (size - segment) / 2 and size - segment; for sizes barely
/// above the threshold the segments overlap, which is fine as long as the
/// byte coverage stays deterministic.
fn hash_partial(path: &Path, size: u64, segment: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();

    hash_segment(&mut file, &mut hasher, segment)?;

    let middle = size.saturating_sub(segment) / 2;
    file.seek(SeekFrom::Start(middle))?;
    hash_segment(&mut file, &mut hasher, segment)?;

    file.seek(SeekFrom::Start(size.saturating_sub(segment)))?;
    hash_segment(&mut file, &mut hasher, segment)?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Feed up to `limit` bytes from the current position; EOF ends the segment.
fn hash_segment(file: &mut File, hasher: &mut Md5, limit: u64) -> io::Result<()> {
    let mut remaining = limit;
    let mut buf = [0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(())
}
