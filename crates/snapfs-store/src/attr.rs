//! File attributes synthesized from tree and blob entries.

/// Tree-entry mode for a regular file.
pub const MODE_FILE: u32 = 0o100644;
/// Tree-entry mode for an executable file.
pub const MODE_FILE_EXEC: u32 = 0o100755;
/// Synthetic mode reported for directories.
pub const MODE_DIR: u32 = 0o040755;
/// Fixed placeholder size reported for directories.
pub const DIR_SIZE: u64 = 4096;

const TYPE_MASK: u32 = 0o170000;
const TYPE_DIR: u32 = 0o040000;

/// Ownership inherited from the repository directory itself.
///
/// The object store records no per-file ownership, so every attribute query
/// reports the uid/gid captured when the store was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Attributes of one file or directory, built on demand from a tree entry.
/// Never persisted outside the object graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttr {
    /// Logical (demangled) entry name.
    pub name: String,
    /// Permission bits plus the type flag.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    /// Exact blob byte length for files, [`DIR_SIZE`] for directories.
    pub size: u64,
}

impl FileAttr {
    /// Synthesized attributes for a directory.
    pub fn directory(name: impl Into<String>, owner: Ownership) -> Self {
        Self {
            name: name.into(),
            mode: MODE_DIR,
            uid: owner.uid,
            gid: owner.gid,
            nlink: 2,
            size: DIR_SIZE,
        }
    }

    /// Attributes for a regular file with the mode stored in its tree entry.
    pub fn file(name: impl Into<String>, mode: u32, size: u64, owner: Ownership) -> Self {
        Self {
            name: name.into(),
            mode,
            uid: owner.uid,
            gid: owner.gid,
            nlink: 1,
            size,
        }
    }

    /// Whether the type flag marks a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & TYPE_MASK == TYPE_DIR
    }

    /// Permission bits without the type flag.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Whether any execute bit is set.
    pub fn is_executable(&self) -> bool {
        !self.is_dir() && self.permissions() & 0o111 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Ownership = Ownership { uid: 1000, gid: 1000 };

    #[test]
    fn directory_attr_is_synthetic() {
        let attr = FileAttr::directory("src", OWNER);
        assert!(attr.is_dir());
        assert_eq!(attr.permissions(), 0o755);
        assert_eq!(attr.size, DIR_SIZE);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn file_attr_reports_blob_size() {
        let attr = FileAttr::file("a.txt", MODE_FILE, 11, OWNER);
        assert!(!attr.is_dir());
        assert_eq!(attr.size, 11);
        assert_eq!(attr.nlink, 1);
        assert!(!attr.is_executable());
    }

    #[test]
    fn executable_bit() {
        let attr = FileAttr::file("run.sh", MODE_FILE_EXEC, 5, OWNER);
        assert!(attr.is_executable());
        assert_eq!(attr.permissions(), 0o755);
    }

    #[test]
    fn ownership_is_inherited() {
        let attr = FileAttr::file("x", MODE_FILE, 0, Ownership { uid: 42, gid: 7 });
        assert_eq!(attr.uid, 42);
        assert_eq!(attr.gid, 7);
    }
}
