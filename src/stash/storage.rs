//! Durable stash storage
//!
//! The manager only needs four operations from storage: write a payload
//! under a name, read it back, list names by prefix and delete by name.
//! All of them are blocking and are called from the blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, Span};

use super::error::StorageError;
use crate::utils::{atomic_write, cleanup_temp_files};

/// File suffix of persisted stashes
pub const STASH_FILE_EXTENSION: &str = ".json";

/// Cold storage for stash payloads
pub trait StashStorage: Send + Sync {
    /// Create the stash `name` and write `payload` to it
    fn write(&self, name: &str, payload: &[u8]) -> Result<(), StorageError>;

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Names of persisted stashes starting with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove a stash; removing a missing stash succeeds
    fn delete(&self, name: &str) -> Result<(), StorageError>;
}

/// Stores each stash as `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct FileStashStorage {
    dir: PathBuf,
}

impl FileStashStorage {
    /// Open a stash directory, creating it if needed and sweeping
    /// temp files left by interrupted writes of stashes with `prefix`
    pub fn open<P: AsRef<Path>>(dir: P, prefix: &str, span: &Span) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        let dir_name = dir.display().to_string();

        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir_name, e))?;
        let cleaned = cleanup_temp_files(&dir, prefix).map_err(|e| StorageError::io(&dir_name, e))?;
        if cleaned > 0 {
            info!(parent: span, cleaned, dir = %dir_name, "removed interrupted stash writes");
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the persisted payload for `name`
    pub fn location(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && !name.contains(|c: char| c == '/' || c == '\\')
            && name != "."
            && name != "..";
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}{}", name, STASH_FILE_EXTENSION)))
    }
}

impl StashStorage for FileStashStorage {
    fn write(&self, name: &str, payload: &[u8]) -> Result<(), StorageError> {
        let path = self.location(name)?;
        atomic_write(&path, payload).map_err(|e| StorageError::io(name, e))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.location(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::io(name, e),
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir_name = self.dir.display().to_string();
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(|e| StorageError::io(&dir_name, e))? {
            let entry = entry.map_err(|e| StorageError::io(&dir_name, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            if let Some(name) = file_name
                .strip_suffix(STASH_FILE_EXTENSION)
                .filter(|n| n.starts_with(prefix))
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.location(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(name, e)),
        }
    }
}
