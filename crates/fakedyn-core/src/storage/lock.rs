use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StorageError;

/// Advisory lock guarding a persistence log against a second engine.
///
/// The lock lives on a sidecar `<log>.lock` file so the log itself can be
/// replaced during compaction. It is released when this struct is dropped.
#[derive(Debug)]
pub struct LogLock {
    _file: File,
    path: PathBuf,
}

impl LogLock {
    /// Sidecar lock path for the log at `log_path`.
    pub fn path_for(log_path: &Path) -> PathBuf {
        let mut name = log_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock for `log_path` without blocking.
    /// Returns `Err(StorageError::FileLocked)` if another engine holds it.
    pub fn acquire(log_path: &Path) -> Result<Self, StorageError> {
        let path = Self::path_for(log_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| StorageError::FileLocked)?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("data.log");

        let _lock = LogLock::acquire(&log_path).unwrap();
        match LogLock::acquire(&log_path) {
            Err(StorageError::FileLocked) => {}
            other => panic!("expected FileLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("data.log");

        {
            let _lock = LogLock::acquire(&log_path).unwrap();
        }
        let lock = LogLock::acquire(&log_path).unwrap();
        assert_eq!(lock.path(), dir.path().join("data.log.lock"));
    }
}
