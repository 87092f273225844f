//! Pluggable cross-process locking around mutating cache operations
//!
//! The engine takes the lock around store (including the eviction it triggers),
//! clear, cleanup, validate, import and every statistics read-modify-write.
//! Acquisition is reentrant within one thread so a statistics update made while
//! a store already holds the lock does not deadlock against itself. Other threads
//! sharing the same engine wait until the holder releases it.

use crate::config::LockMode;
use crate::{Error, Result};
use fs4::fs_std::FileExt;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

/// A lock capability the engine acquires around mutating operations
pub trait CacheLock: Send + Sync + fmt::Debug {
    /// Block until the lock is held by this process
    fn lock(&self) -> Result<()>;

    /// Release one level of acquisition
    fn unlock(&self);
}

/// RAII guard releasing a [`CacheLock`] on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn CacheLock,
}

impl<'a> LockGuard<'a> {
    /// Acquire `lock` and hold it for the guard's lifetime
    pub fn acquire(lock: &'a dyn CacheLock) -> Result<Self> {
        lock.lock()?;
        Ok(Self { lock })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Lock that never blocks; callers serialize invocations externally
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

impl CacheLock for NoopLock {
    fn lock(&self) -> Result<()> {
        Ok(())
    }

    fn unlock(&self) {}
}

#[derive(Debug, Default)]
struct FileLockState {
    file: Option<File>,
    owner: Option<ThreadId>,
    depth: usize,
}

/// Exclusive advisory lock on a file under the cache root
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    state: Mutex<FileLockState>,
    released: Condvar,
}

impl FileLock {
    /// Lock backed by the file at `path` (created on first acquisition)
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileLockState::default()),
            released: Condvar::new(),
        }
    }

    /// Path of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheLock for FileLock {
    fn lock(&self) -> Result<()> {
        let current = thread::current().id();
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::lock(&self.path, "lock state poisoned"))?;

        while state.depth > 0 && state.owner != Some(current) {
            state = self
                .released
                .wait(state)
                .map_err(|_| Error::lock(&self.path, "lock state poisoned"))?;
        }

        if state.depth == 0 {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::io(e, parent, "create_dir_all"))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)
                .map_err(|e| Error::io(e, &self.path, "open"))?;

            // Blocks until any other process releases its lock
            FileExt::lock_exclusive(&file).map_err(|e| {
                Error::lock(&self.path, format!("Failed to acquire exclusive lock: {e}"))
            })?;
            tracing::trace!(path = %self.path.display(), "Acquired cache lock");
            state.file = Some(file);
            state.owner = Some(current);
        }
        state.depth += 1;
        Ok(())
    }

    fn unlock(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.owner != Some(thread::current().id()) {
            return;
        }
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return;
        }
        state.owner = None;
        if let Some(file) = state.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(path = %self.path.display(), "Failed to release cache lock: {e}");
            }
            tracing::trace!(path = %self.path.display(), "Released cache lock");
        }
        drop(state);
        self.released.notify_all();
    }
}

/// Build the lock implementation selected by `mode`
#[must_use]
pub fn lock_for(mode: LockMode, lock_path: &Path) -> Arc<dyn CacheLock> {
    match mode {
        LockMode::None => Arc::new(NoopLock),
        LockMode::File => Arc::new(FileLock::new(lock_path)),
    }
}
