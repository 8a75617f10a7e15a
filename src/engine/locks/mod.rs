//! Scratch Directory Lock
//!
//! Keeps two updater processes from sharing one staging file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const LOCK_FILENAME: &str = "update.lock";

/// Information stored in a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub target_version: Option<String>,
}

impl LockInfo {
    pub fn new(target_version: Option<&str>) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            target_version: target_version.map(str::to_string),
        }
    }

    /// Check if the process that created the lock is still running
    pub fn is_process_alive(&self) -> bool {
        if self.pid == std::process::id() {
            return true;
        }

        #[cfg(unix)]
        {
            use std::process::Command;
            Command::new("kill")
                .args(["-0", &self.pid.to_string()])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        }

        #[cfg(windows)]
        {
            use std::process::Command;
            Command::new("tasklist")
                .args(["/FI", &format!("PID eq {}", self.pid)])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).contains(&self.pid.to_string()))
                .unwrap_or(false)
        }

        #[cfg(not(any(unix, windows)))]
        true
    }
}

/// Lock errors
#[derive(Debug)]
pub enum LockError {
    AlreadyLocked { pid: u32 },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::AlreadyLocked { pid } => write!(f, "Update lock held by PID {}", pid),
            LockError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for LockError {}

/// PID lock file inside the scratch directory
pub struct StagingLock;

impl StagingLock {
    pub fn lock_path(scratch_dir: &Path) -> PathBuf {
        scratch_dir.join(LOCK_FILENAME)
    }

    /// Acquire the lock, reclaiming it if its holder has died
    pub fn acquire(scratch_dir: &Path, target_version: Option<&str>) -> Result<LockGuard, LockError> {
        fs::create_dir_all(scratch_dir)?;
        let lock_path = Self::lock_path(scratch_dir);

        // One retry after clearing a stale lock
        for _ in 0..2 {
            match Self::create(&lock_path, target_version) {
                Ok(guard) => return Ok(guard),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    match Self::read(&lock_path) {
                        Some(existing) if existing.is_process_alive() => {
                            return Err(LockError::AlreadyLocked { pid: existing.pid });
                        }
                        _ => {
                            tracing::warn!(path = %lock_path.display(), "removing stale update lock");
                            let _ = fs::remove_file(&lock_path);
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        match Self::read(&lock_path) {
            Some(existing) => Err(LockError::AlreadyLocked { pid: existing.pid }),
            None => Err(LockError::IoError(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "update lock could not be acquired",
            ))),
        }
    }

    /// Read the current holder, if any
    pub fn read(lock_path: &Path) -> Option<LockInfo> {
        fs::read_to_string(lock_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
    }

    /// Write the lock beside its final name, then link it into place without
    /// replacing an existing one. Readers never see a half-written lock.
    fn create(lock_path: &Path, target_version: Option<&str>) -> io::Result<LockGuard> {
        let dir = lock_path.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut staged, &LockInfo::new(target_version))?;
        staged.flush()?;
        staged.persist_noclobber(lock_path).map_err(|e| e.error)?;
        Ok(LockGuard {
            lock_path: lock_path.to_path_buf(),
        })
    }
}

/// RAII guard that releases lock on drop
pub struct LockGuard {
    lock_path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_release() {
        let dir = tempdir().unwrap();

        let guard = StagingLock::acquire(dir.path(), Some("1.2.0")).unwrap();
        assert!(guard.path().exists());
        let info = StagingLock::read(guard.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.target_version.as_deref(), Some("1.2.0"));

        // Can't acquire same lock twice
        assert!(matches!(
            StagingLock::acquire(dir.path(), None),
            Err(LockError::AlreadyLocked { .. })
        ));

        drop(guard);

        // Can acquire after release
        assert!(StagingLock::acquire(dir.path(), None).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let stale = LockInfo {
            pid: u32::MAX - 1,
            started_at: Utc::now(),
            target_version: None,
        };
        fs::write(
            StagingLock::lock_path(dir.path()),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let guard = StagingLock::acquire(dir.path(), None).unwrap();
        assert_eq!(StagingLock::read(guard.path()).unwrap().pid, std::process::id());
    }

    #[test]
    fn test_lock_appears_fully_written() {
        let dir = tempdir().unwrap();
        let guard = StagingLock::acquire(dir.path(), Some("1.2.0")).unwrap();

        // Only the lock itself, no leftover staging file
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(LOCK_FILENAME)]);

        // A losing contender leaves the holder's content untouched
        let before = fs::read_to_string(guard.path()).unwrap();
        assert!(StagingLock::acquire(dir.path(), None).is_err());
        assert_eq!(fs::read_to_string(guard.path()).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        fs::write(StagingLock::lock_path(dir.path()), "garbage").unwrap();
        assert!(StagingLock::acquire(dir.path(), None).is_ok());
    }
}
