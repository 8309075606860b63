//! Best-effort advisory lock around a write-back.
//!
//! The lock lives in a sibling `<file>.lock` that stays on disk; closing it
//! releases the lock. Failing to take it is logged and the write goes ahead
//! unlocked; an in-memory session is never dropped because another process
//! holds the lock.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs2::FileExt;

use crate::error::ConfigError;

const ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(20);

/// Held lock. Dropping closes the file, which releases it.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    target.with_file_name(name)
}

impl FileLock {
    /// Take the lock for `target`, retrying briefly.
    pub fn acquire(target: &Path) -> Result<FileLock, ConfigError> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        }
        let file = File::create(&lock_path).map_err(|source| ConfigError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        let mut attempt = 1;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    return Ok(FileLock { _file: file });
                }
                Err(source) if attempt >= ATTEMPTS => {
                    return Err(ConfigError::Lock {
                        path: lock_path,
                        source,
                    });
                }
                Err(_) => {
                    attempt += 1;
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but a failure only logs.
    pub fn try_acquire(target: &Path) -> Option<FileLock> {
        match Self::acquire(target) {
            Ok(lock) => Some(lock),
            Err(err) => {
                tracing::warn!(path = %target.display(), "writing without lock: {err}");
                None
            }
        }
    }
}
