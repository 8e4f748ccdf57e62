//! Thin wrapper around the `trash` crate.
//!
//! Why this exists:
//! - Platform trash backends (COM on Windows, DBus portals on Linux) can
//!   panic inside the dependency. Deletion failures must never take down a
//!   purge that is halfway through a list, so panics are converted into
//!   errors the caller logs and skips.

use anyhow::{anyhow, Result};
use std::any::Any;
use std::path::Path;

fn panic_payload_to_string(panic_payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn catch_trash_panic<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(panic_payload) => {
            let msg = panic_payload_to_string(panic_payload);
            Err(anyhow!("trash operation panicked (dependency bug): {msg}"))
        }
    }
}

/// Delete a file: permanently unlink, or route to the OS trash.
pub fn delete(path: &Path, permanent: bool) -> Result<()> {
    if permanent {
        std::fs::remove_file(path)?;
        Ok(())
    } else {
        catch_trash_panic(|| Ok(trash::delete(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_delete_unlinks() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("gone.txt");
        std::fs::write(&file, "x").unwrap();

        delete(&file, true).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn permanent_delete_on_missing_file_errors() {
        let temp = tempfile::tempdir().unwrap();
        assert!(delete(&temp.path().join("absent"), true).is_err());
    }
}
