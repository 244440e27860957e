//! Open-file-handle bookkeeping for SnapFS.
//!
//! The object store's unit of change is a whole-tree commit, but POSIX hands
//! out stateful file descriptors. This crate bridges the two:
//!
//! - [`OpenContext`] owns a private scratch copy of one file's bytes for one
//!   opener, tracking dirty/executable/forced-commit state.
//! - [`HandleRegistry`] indexes contexts by logical path so structural
//!   changes (rename, truncate, chmod, unlink) reach every concurrent
//!   opener of a path.
//! - [`flusher::spawn`] runs the periodic thread that bounds the data-loss
//!   window of files left open without an explicit flush.

pub mod context;
pub mod flusher;
pub mod registry;

pub use context::OpenContext;
pub use registry::{HandleRegistry, SharedContext};
