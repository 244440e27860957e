//! One open-file context per successful open/create call.

use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use snapfs_store::{GitStore, StoreResult};

/// A private scratch copy of one file's bytes, bridging POSIX file
/// descriptor semantics onto the immutable object store.
///
/// Created on open/create with the scratch copy seeded from the committed
/// blob (or empty, for create). Reads and writes go to the scratch file;
/// dirty content is committed on flush/release. The scratch file descriptor
/// closes and the file is deleted when the context is dropped.
///
/// Several contexts may exist for the same path at once -- each keeps an
/// independent scratch copy, so the last closer's content wins.
#[derive(Debug)]
pub struct OpenContext {
    /// Logical (unmangled) path; cleared when the file is unlinked while
    /// still open.
    path: String,
    scratch: NamedTempFile,
    dirty: bool,
    executable: bool,
    commit_on_next_write: bool,
}

impl OpenContext {
    /// Create a context whose scratch file starts with `seed`.
    pub fn new(path: impl Into<String>, executable: bool, seed: &[u8]) -> io::Result<Self> {
        let scratch = NamedTempFile::new()?;
        scratch.as_file().write_all_at(seed, 0)?;
        Ok(Self {
            path: path.into(),
            scratch,
            dirty: false,
            executable,
            commit_on_next_write: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn executable(&self) -> bool {
        self.executable
    }

    /// Whether the next write must commit (set by the periodic flusher).
    pub fn is_armed(&self) -> bool {
        self.commit_on_next_write
    }

    /// Mark this context for a forced commit on its next write.
    pub fn arm(&mut self) {
        self.commit_on_next_write = true;
    }

    /// Whether the backing path was unlinked while this context was open.
    pub fn is_detached(&self) -> bool {
        self.path.is_empty()
    }

    pub(crate) fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
    }

    pub(crate) fn detach(&mut self) {
        self.path.clear();
    }

    /// Read up to `size` bytes starting at `offset` from the scratch copy.
    pub fn read(&self, offset: u64, size: u32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match self
                .scratch
                .as_file()
                .read_at(&mut buf[filled..], offset + filled as u64)
            {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write `data` at `offset` into the scratch copy and mark it dirty.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<u32> {
        self.scratch.as_file().write_all_at(data, offset)?;
        self.dirty = true;
        Ok(data.len() as u32)
    }

    /// Resize the scratch copy. Leaves the dirty flag untouched; the
    /// store-level truncate commits the resize on its own.
    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.scratch.as_file().set_len(size)
    }

    /// Record the desired executable bit for the next commit.
    pub fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    /// Current scratch copy length.
    pub fn size(&self) -> io::Result<u64> {
        Ok(self.scratch.as_file().metadata()?.len())
    }

    /// Commit the scratch content if dirty. Returns `false` when there was
    /// nothing to commit (clean, or detached by unlink).
    pub fn commit(&mut self, store: &GitStore, message: &str) -> StoreResult<bool> {
        if !self.dirty {
            debug!(path = %self.path, "not dirty");
            return Ok(false);
        }
        let committed = if self.path.is_empty() {
            false
        } else {
            store.commit_file(&self.path, self.scratch.path(), message, self.executable)?;
            true
        };
        self.dirty = false;
        self.commit_on_next_write = false;
        Ok(committed)
    }
}
