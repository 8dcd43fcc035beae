//! Module dedicated to the per-mailbox advisory lock.
//!
//! Sync, force-sync and purge batches touching the same mailbox must
//! not interleave. Each orchestrated operation takes a
//! [`MailboxLock`] before touching a mailbox and releases it on drop.
//! The lock is an advisory file lock carrying a lease expiry: a lease
//! whose holder died without releasing it (e.g. on a shared mount)
//! can be broken once expired.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use advisory_lock::{AdvisoryFileLock, FileLockError, FileLockMode};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// The global `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to the mailbox lock.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open mailbox lock file {1}")]
    OpenLockFileError(#[source] std::io::Error, PathBuf),
    #[error("cannot write mailbox lease into {1}")]
    WriteLeaseError(#[source] std::io::Error, PathBuf),
    #[error("cannot lock mailbox lock file {1}")]
    LockFileError(#[source] std::io::Error, PathBuf),
    #[error("mailbox {0} is locked by another operation")]
    MailboxBusyError(String),
}

/// An acquired per-mailbox lease, released on drop.
#[derive(Debug)]
pub struct MailboxLock {
    file: File,
    path: PathBuf,
}

impl MailboxLock {
    /// Acquires the lock of the given mailbox, breaking a stale lease
    /// when its TTL expired.
    pub fn acquire(dir: &Path, mailbox: &str, ttl: Duration) -> Result<Self> {
        let name: String = mailbox
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let path = dir.join(format!("mailback.{name}.lock"));

        Self::try_acquire(&path, mailbox, ttl, true)
    }

    fn try_acquire(path: &Path, mailbox: &str, ttl: Duration, break_stale: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| Error::OpenLockFileError(err, path.to_owned()))?;

        // fully qualified: std's File grew inherent try_lock/unlock
        match AdvisoryFileLock::try_lock(&file, FileLockMode::Exclusive) {
            Ok(()) => {
                let expires_at = Utc::now()
                    + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());

                file.set_len(0)
                    .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
                    .and_then(|_| file.write_all(expires_at.to_rfc3339().as_bytes()))
                    .map_err(|err| Error::WriteLeaseError(err, path.to_owned()))?;

                debug!(mailbox, lock = %path.display(), "acquired mailbox lock");

                Ok(Self {
                    file,
                    path: path.to_owned(),
                })
            }
            Err(FileLockError::AlreadyLocked) => {
                let mut lease = String::new();
                let _ = file.read_to_string(&mut lease);

                let expired = lease
                    .trim()
                    .parse::<DateTime<Utc>>()
                    .map(|expires_at| Utc::now() > expires_at)
                    .unwrap_or(false);

                if expired && break_stale {
                    warn!(mailbox, lock = %path.display(), "breaking expired mailbox lease");
                    let _ = std::fs::remove_file(path);
                    return Self::try_acquire(path, mailbox, ttl, false);
                }

                Err(Error::MailboxBusyError(mailbox.to_owned()))
            }
            Err(FileLockError::Io(err)) => Err(Error::LockFileError(err, path.to_owned())),
        }
    }
}

impl Drop for MailboxLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        if let Err(err) = AdvisoryFileLock::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %err, "cannot release mailbox lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_of_the_same_mailbox_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(60);

        let _lock = MailboxLock::acquire(dir.path(), "user@example.com", ttl).unwrap();
        let busy = MailboxLock::acquire(dir.path(), "user@example.com", ttl);

        assert!(matches!(busy, Err(Error::MailboxBusyError(_))));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(60);

        drop(MailboxLock::acquire(dir.path(), "user@example.com", ttl).unwrap());

        assert!(MailboxLock::acquire(dir.path(), "user@example.com", ttl).is_ok());
    }

    #[test]
    fn different_mailboxes_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(60);

        let _a = MailboxLock::acquire(dir.path(), "a@example.com", ttl).unwrap();
        let _b = MailboxLock::acquire(dir.path(), "b@example.com", ttl).unwrap();
    }
}
