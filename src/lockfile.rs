//! # Single-Writer Lock
//!
//! Every resource this tool touches is host-global: the firmware directory,
//! the descriptor registry, the package database, the daemon reload. Two
//! concurrent runs could each observe a file absent and both create it, or
//! double-send the reload signal. The binary therefore takes a lock file
//! before the first side-effecting step and holds it for the whole run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("Another provisioning run holds the lock at {0}")]
    Held(PathBuf),
    #[error("Could not create lock file {0}, reason: {1}")]
    Io(PathBuf, String),
}

/// Lock file guard with `O_CREAT|O_EXCL` semantics; the pid of the holder is
/// recorded inside and the file is removed when the guard drops.
#[derive(Debug)]
pub struct HostLock {
    path: PathBuf,
}

impl HostLock {
    pub fn acquire(path: &Path) -> Result<HostLock, LockError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => LockError::Held(path.to_path_buf()),
                _ => LockError::Io(path.to_path_buf(), e.to_string()),
            })?;
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Could not record pid in lock file: {}", e);
        }
        Ok(HostLock {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                "Could not remove lock file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
