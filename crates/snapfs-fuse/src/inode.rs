//! Inode-number assignment for logical paths.
//!
//! The kernel addresses everything by inode number while the store only
//! knows logical paths, so the dispatch layer keeps a bidirectional table.
//! Numbers are assigned on first sight and stay stable for the lifetime of
//! the mount; a rename rewrites the paths in place so the numbers survive.

use std::collections::HashMap;
use std::sync::Mutex;

/// Inode number of the mount root, fixed by the kernel protocol.
pub const ROOT_INO: u64 = 1;

#[derive(Debug, Default)]
struct Tables {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next: u64,
}

/// Bidirectional inode-number/path table.
#[derive(Debug)]
pub struct InodeTable {
    inner: Mutex<Tables>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut tables = Tables {
            next: ROOT_INO + 1,
            ..Tables::default()
        };
        tables.by_ino.insert(ROOT_INO, "/".to_string());
        tables.by_path.insert("/".to_string(), ROOT_INO);
        Self {
            inner: Mutex::new(tables),
        }
    }

    /// The inode number for `path`, assigning a fresh one on first sight.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let mut tables = self.lock();
        if let Some(&ino) = tables.by_path.get(path) {
            return ino;
        }
        let ino = tables.next;
        tables.next += 1;
        tables.by_ino.insert(ino, path.to_string());
        tables.by_path.insert(path.to_string(), ino);
        ino
    }

    /// The logical path currently assigned to `ino`.
    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.lock().by_ino.get(&ino).cloned()
    }

    /// Drop the mapping for `path` after it was unlinked or removed.
    pub fn forget_path(&self, path: &str) {
        let mut tables = self.lock();
        if let Some(ino) = tables.by_path.remove(path) {
            tables.by_ino.remove(&ino);
        }
    }

    /// Rewrite `old` (and, for a directory, everything under it) to `new`,
    /// keeping every affected inode number.
    pub fn retarget(&self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let mut tables = self.lock();
        let prefix = format!("{old}/");
        let affected: Vec<(String, u64)> = tables
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (path, ino) in affected {
            let renamed = if path == old {
                new.to_string()
            } else {
                format!("{new}/{}", &path[prefix.len()..])
            };
            tables.by_path.remove(&path);
            tables.by_path.insert(renamed.clone(), ino);
            tables.by_ino.insert(ino, renamed);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner.lock().expect("inode table lock poisoned")
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
