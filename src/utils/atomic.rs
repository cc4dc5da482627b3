//! Atomic file operations
//!
//! Stash payloads are written to a `.tmp` sibling, synced, then renamed
//! into place, so a reader never observes a half-written stash. After a
//! crash the final file is either absent or complete; stale `.tmp` files
//! are swept by [`cleanup_temp_files`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Path of the temp file used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Atomically write `content` to `path`
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |file| file.write_all(content))
}

/// Atomically write using a writer function
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = temp_path(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let result = File::create(&temp_path)
        .and_then(|mut file| {
            write_fn(&mut file)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        // Leave nothing behind for a failed write
        let _ = fs::remove_file(&temp_path);
    }

    result
}

/// Remove leftover `.tmp` files starting with `prefix` in `dir`
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P, prefix: &str) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut cleaned = 0;

    if !dir.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);
        let is_temp = path.extension().map(|e| e == "tmp").unwrap_or(false);

        if is_ours && is_temp && entry.file_type()?.is_file() {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}
