//! Per-system advisory locking.
//!
//! Git's own index locking only protects individual operations; the revision
//! log performs multi-step sequences (untag then tag, stage then commit)
//! that must not interleave between two writers of the same system. Every
//! mutating revision-log operation therefore takes an exclusive lock on the
//! system repository first. The lock is advisory and scoped to the lifetime
//! of the returned guard.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const LOCK_FILENAME: &str = ".convoy.lock";

/// Holder information written into the lock file for diagnostics.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub operation: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "system repository is locked by another process: {operation} (PID {pid})\n\
     If you're sure no convoy process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    operation: String,
    pid: u32,
    lock_path: PathBuf,
  },

  #[error(
    "system repository is locked (could not read lock metadata)\n\
     If you're sure no convoy process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Exclusive lock on one system repository. Released on drop.
pub struct SystemLock {
  _file: File,
  lock_path: PathBuf,
}

impl SystemLock {
  /// Acquire the lock for `repo_path`, recording `operation` so a contending
  /// caller can report who holds it.
  pub fn acquire(repo_path: &Path, operation: &str) -> Result<Self, LockError> {
    let lock_path = repo_path.join(LOCK_FILENAME);

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = try_lock(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    Self::write_metadata(&file, operation)?;

    Ok(SystemLock {
      _file: file,
      lock_path,
    })
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn write_metadata(file: &File, operation: &str) -> Result<(), LockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      operation: operation.to_string(),
    };

    file.set_len(0).map_err(LockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(LockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> LockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return LockError::Contention {
          operation: metadata.operation,
          pid: metadata.pid,
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    LockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

// Advisory locking is only enforced on unix hosts.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
  Ok(())
}
