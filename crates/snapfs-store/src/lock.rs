//! Mutual exclusion over the repository handle.

use std::sync::{Mutex, MutexGuard};

/// Serializes every access to the repository's working index and `HEAD`.
///
/// Mutators acquire [`write`](RepoLock::write); pure reads acquire
/// [`read`](RepoLock::read). libgit2 repository handles are not safe for
/// concurrent shared use across threads, so both modes map onto the same
/// exclusive section; the split is kept in the API so call sites state their
/// intent and commits stay totally ordered by write-acquisition order.
pub struct RepoLock {
    inner: Mutex<git2::Repository>,
}

impl RepoLock {
    pub fn new(repo: git2::Repository) -> Self {
        Self {
            inner: Mutex::new(repo),
        }
    }

    /// Acquire the lock for a read-only snapshot resolution.
    pub fn read(&self) -> MutexGuard<'_, git2::Repository> {
        self.inner.lock().expect("repository lock poisoned")
    }

    /// Acquire the lock for a commit-producing sequence.
    pub fn write(&self) -> MutexGuard<'_, git2::Repository> {
        self.inner.lock().expect("repository lock poisoned")
    }
}

impl std::fmt::Debug for RepoLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLock").finish_non_exhaustive()
    }
}
