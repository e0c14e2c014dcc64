//! Filesystem singleton lock.
//!
//! Guarantees that at most one registrar process acts on behalf of a given
//! parent domain by racing an atomic hardlink against a well-known path.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Errors raised by lock acquisition.
#[derive(Debug)]
pub enum LockError {
    /// A lockfile already exists at the target path and is held by another process.
    AlreadyLocked,
    /// The lock's temp/link/write dance failed at the filesystem layer.
    Io(std::io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::AlreadyLocked => write!(f, "lockfile already held by another process"),
            LockError::Io(e) => write!(f, "lockfile I/O error: {e}"),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Io(e) => Some(e),
            LockError::AlreadyLocked => None,
        }
    }
}

impl From<std::io::Error> for LockError {
    fn from(e: std::io::Error) -> Self {
        LockError::Io(e)
    }
}

/// A held process lock. Dropping it does not remove the lockfile: ownership
/// is decided by lockfile *content* (the writing process's pid), not by the
/// handle's lifetime, matching the upstream registrar's behavior.
pub struct SubdomainLock {
    path: PathBuf,
}

impl SubdomainLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock at `lockfile_path`, creating parent directories as needed.
    ///
    /// Implementation: create a uniquely-named temp file in the same
    /// directory, then hardlink it onto `lockfile_path`. The link fails with
    /// `EEXIST` if another process already holds the lock — this is the
    /// atomic handoff point, immune to a check-then-create race. On success
    /// the temp name is unlinked (the open descriptor is still valid) and the
    /// current process id is written into the now-linked file.
    pub fn acquire(lockfile_path: impl AsRef<Path>) -> Result<SubdomainLock, LockError> {
        let lockfile_path = lockfile_path.as_ref();
        if let Some(dir) = lockfile_path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let dir = lockfile_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let pid = std::process::id();
        let tmp_path = dir.join(format!(".subd.registrar.lock.{pid}.{}", tmp_suffix()));

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&tmp_path)?;

        let link_result = fs::hard_link(&tmp_path, lockfile_path);
        let _ = fs::remove_file(&tmp_path);

        match link_result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyLocked);
            }
            Err(e) => return Err(LockError::Io(e)),
        }

        let buf = format!("{pid}\n");
        tmp_file.write_all(buf.as_bytes())?;
        tmp_file.flush()?;
        drop(tmp_file);

        tracing::info!(path = %lockfile_path.display(), pid, "acquired registrar lock");

        Ok(SubdomainLock {
            path: lockfile_path.to_path_buf(),
        })
    }

    /// Does `lockfile_path` exist and carry *this* process's pid?
    ///
    /// A lockfile written by any other process — including one still
    /// legitimately running — is indistinguishable from a stale one under
    /// this check and is deleted. This mirrors the upstream registrar's
    /// `is_lockfile_valid`/`is_lockfile_stale` pair exactly; it is a known
    /// sharp edge, not a defect introduced here, and is not silently
    /// "fixed" to compare against the lock-holder's own recorded pid.
    pub fn is_valid(lockfile_path: impl AsRef<Path>) -> bool {
        let lockfile_path = lockfile_path.as_ref();
        let Ok(contents) = fs::read_to_string(lockfile_path) else {
            return false;
        };
        let stale = match contents.trim().parse::<u32>() {
            Ok(pid) => pid != std::process::id(),
            Err(_) => true,
        };
        if stale {
            tracing::debug!(path = %lockfile_path.display(), "removing stale registrar lockfile");
            let _ = fs::remove_file(lockfile_path);
            false
        } else {
            true
        }
    }
}

fn tmp_suffix() -> u64 {
    // Derived from the thread id's hash rather than a clock or RNG so the
    // suffix stays deterministic-enough for tests while still being unique
    // per concurrent acquire() call within one process.
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_lockfile_with_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.lock");
        let lock = SubdomainLock::acquire(&path).expect("first acquire succeeds");
        assert!(path.exists());
        assert!(SubdomainLock::is_valid(lock.path()));
    }

    #[test]
    fn second_acquire_in_same_process_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.lock");
        let _lock = SubdomainLock::acquire(&path).expect("first acquire succeeds");
        let second = SubdomainLock::acquire(&path);
        assert!(matches!(second, Err(LockError::AlreadyLocked)));
    }

    #[test]
    fn is_valid_false_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.lock");
        assert!(!SubdomainLock::is_valid(&path));
    }

    #[test]
    fn foreign_pid_content_is_treated_as_stale_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.lock");
        fs::write(&path, "999999999\n").unwrap();
        assert!(!SubdomainLock::is_valid(&path));
        assert!(!path.exists());
    }
}
