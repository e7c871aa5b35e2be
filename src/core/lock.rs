#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt as _;
use tracing::debug;

use crate::error::BoardError;

/// Exclusive board lock. Held until [`LockHandle::release`] or drop.
#[derive(Debug)]
pub struct LockHandle {
    file: Option<File>,
    path: PathBuf,
}

/// Blocks until the lock at `path` is ours. Not re-entrant: a second acquire
/// from the same process waits like any other actor.
pub fn acquire(path: &Path) -> Result<LockHandle, BoardError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| BoardError::io_path("opening lock file", path, e))?;
    file.lock_exclusive()
        .map_err(|e| BoardError::io_path("locking", path, e))?;
    debug!(path = %path.display(), "acquired board lock");
    Ok(LockHandle {
        file: Some(file),
        path: path.to_path_buf(),
    })
}

impl LockHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&mut self) -> Result<(), BoardError> {
        let file = self.file.take().ok_or(BoardError::LockReleased)?;
        fs2::FileExt::unlock(&file).map_err(|e| BoardError::io_path("unlocking", &self.path, e))?;
        debug!(path = %self.path.display(), "released board lock");
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn acquire_creates_lock_file_and_releases_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let mut lock = acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);
        lock.release().unwrap();
        assert!(matches!(lock.release(), Err(BoardError::LockReleased)));
    }

    #[test]
    fn acquire_fails_without_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(".lock");
        assert!(acquire(&path).is_err());
    }

    #[test]
    fn second_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let mut held = acquire(&path).unwrap();

        let got_it = Arc::new(AtomicBool::new(false));
        let waiter = {
            let path = path.clone();
            let got_it = Arc::clone(&got_it);
            std::thread::spawn(move || {
                let mut lock = acquire(&path).unwrap();
                got_it.store(true, Ordering::SeqCst);
                lock.release().unwrap();
            })
        };

        std::thread::sleep(Duration::from_millis(150));
        assert!(!got_it.load(Ordering::SeqCst));
        held.release().unwrap();
        waiter.join().unwrap();
        assert!(got_it.load(Ordering::SeqCst));
    }

    #[test]
    fn threads_are_mutually_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let inside = Arc::new(AtomicBool::new(false));
        let entered = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                let inside = Arc::clone(&inside);
                let entered = Arc::clone(&entered);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let _lock = acquire(&path).unwrap();
                        assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                        entered.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(entered.load(Ordering::SeqCst), 20);
    }
}
