//! Repository-backed storage engine for SnapFS.
//!
//! This crate translates POSIX-style filesystem operations into reads and
//! atomic commits against a bare git repository:
//!
//! - [`GitStore`] resolves `HEAD` to a snapshot for attribute and listing
//!   queries, and funnels every mutation (create, write, truncate, chmod,
//!   rename, unlink, mkdir, rmdir) through a single stage-then-commit
//!   sequence whose result is one new commit with the previous `HEAD` as its
//!   sole parent.
//! - [`FileAttr`] is synthesized on demand from tree/blob entries; ownership
//!   comes from the repository directory itself.
//! - [`RepoLock`] brackets all repository access; commits are totally
//!   ordered by its write-acquisition order.
//! - [`FsConfig`] carries the recognized behavior options
//!   (`commit_on_write`, `read_only`, `flush_interval_secs`).
//!
//! # Design Rules
//!
//! 1. A mutator either commits durably or raises before any caller-visible
//!    state changes; an uncommitted stage is discarded.
//! 2. Store-library error codes are checked at every call site and preserved
//!    in [`StoreError::StoreOperation`]; nothing is silently retried.
//! 3. Paths cross the [`snapfs_path`] codec on the way in; entries that fail
//!    demangling on the way out are invisible to callers.

pub mod attr;
pub mod config;
pub mod error;
pub mod lock;
pub mod store;

pub use attr::{FileAttr, Ownership, DIR_SIZE, MODE_DIR, MODE_FILE, MODE_FILE_EXEC};
pub use config::FsConfig;
pub use error::{StoreError, StoreResult};
pub use lock::RepoLock;
pub use store::{CommitInfo, GitStore};
