//! Process-wide table of outstanding open-file contexts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::context::OpenContext;

/// A context shared between the dispatch layer's file-handle table and the
/// registry's per-path index.
pub type SharedContext = Arc<Mutex<OpenContext>>;

/// Registry of open contexts keyed by logical path.
///
/// Multiple contexts may coexist under one path (concurrent openers).
/// The map has its own lock, independent of the repository lock: open/close
/// bookkeeping never touches the object store. Lock order is always the map
/// first, then individual contexts.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    contexts: Mutex<HashMap<String, Vec<SharedContext>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a freshly created context and hand back the shared handle.
    pub fn register(&self, ctx: OpenContext) -> SharedContext {
        let path = ctx.path().to_string();
        let shared = Arc::new(Mutex::new(ctx));
        let mut map = self.lock_map();
        map.entry(path).or_default().push(Arc::clone(&shared));
        shared
    }

    /// Drop a context from the index. The caller's remaining `Arc` clones
    /// keep the scratch file alive until the last one is gone.
    pub fn unregister(&self, ctx: &SharedContext) {
        let mut map = self.lock_map();
        let path = ctx.lock().expect("open context lock poisoned").path().to_string();
        if let Some(list) = map.get_mut(&path) {
            list.retain(|c| !Arc::ptr_eq(c, ctx));
            if list.is_empty() {
                map.remove(&path);
            }
        }
    }

    /// Apply `f` to every context currently open for `path`.
    ///
    /// Used to propagate truncate/chmod/rename side effects to all open
    /// copies without committing on their behalf.
    pub fn for_each<F>(&self, path: &str, mut f: F)
    where
        F: FnMut(&mut OpenContext),
    {
        let list = {
            let map = self.lock_map();
            map.get(path).cloned().unwrap_or_default()
        };
        for ctx in list {
            f(&mut ctx.lock().expect("open context lock poisoned"));
        }
    }

    /// Re-index a single context under a new path. A no-op when the paths
    /// are equal.
    pub fn rename_context(&self, ctx: &SharedContext, new_path: &str) {
        let mut map = self.lock_map();
        let mut guard = ctx.lock().expect("open context lock poisoned");
        let old_path = guard.path().to_string();
        if old_path == new_path {
            return;
        }
        if let Some(list) = map.get_mut(&old_path) {
            list.retain(|c| !Arc::ptr_eq(c, ctx));
            if list.is_empty() {
                map.remove(&old_path);
            }
        }
        guard.set_path(new_path);
        drop(guard);
        map.entry(new_path.to_string()).or_default().push(Arc::clone(ctx));
    }

    /// Move every context open under `old` to `new`, updating each context
    /// in place. Invoked once per moved path during a rename.
    pub fn retarget(&self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let mut map = self.lock_map();
        let Some(list) = map.remove(old) else {
            return;
        };
        debug!(old, new, contexts = list.len(), "retargeting open contexts");
        for ctx in &list {
            ctx.lock().expect("open context lock poisoned").set_path(new);
        }
        map.entry(new.to_string()).or_default().extend(list);
    }

    /// Detach every context open for `path` after it was unlinked: the
    /// contexts stay usable through their file handles but will no longer
    /// commit.
    pub fn detach_all(&self, path: &str) {
        let mut map = self.lock_map();
        let Some(list) = map.remove(path) else {
            return;
        };
        debug!(path, contexts = list.len(), "detaching open contexts");
        for ctx in &list {
            ctx.lock().expect("open context lock poisoned").detach();
        }
        map.entry(String::new()).or_default().extend(list);
    }

    /// Arm every open context for a forced commit on its next write.
    /// Returns the number of contexts touched.
    pub fn arm_all(&self) -> usize {
        let map = self.lock_map();
        let mut armed = 0;
        for list in map.values() {
            for ctx in list {
                ctx.lock().expect("open context lock poisoned").arm();
                armed += 1;
            }
        }
        armed
    }

    /// Number of contexts currently open for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.lock_map().get(path).map_or(0, Vec::len)
    }

    /// Paths with at least one open context.
    pub fn open_paths(&self) -> Vec<String> {
        self.lock_map().keys().cloned().collect()
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<SharedContext>>> {
        self.contexts.lock().expect("handle registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapfs_store::{FsConfig, GitStore, StoreError};

    fn open_store() -> (tempfile::TempDir, GitStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GitStore::open(&dir.path().join("repo.git"), FsConfig::default()).unwrap();
        (dir, store)
    }

    fn ctx(path: &str) -> OpenContext {
        OpenContext::new(path, false, b"").unwrap()
    }

    #[test]
    fn register_and_count() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        let _b = registry.register(ctx("/a"));
        assert_eq!(registry.count("/a"), 2);

        registry.unregister(&a);
        assert_eq!(registry.count("/a"), 1);
    }

    #[test]
    fn unregistering_last_context_clears_path() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        registry.unregister(&a);
        assert_eq!(registry.count("/a"), 0);
        assert!(registry.open_paths().is_empty());
    }

    #[test]
    fn scratch_deleted_after_unregister_and_drop() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        let scratch = a.lock().unwrap().scratch_path().to_path_buf();
        registry.unregister(&a);
        assert!(scratch.exists());
        drop(a);
        assert!(!scratch.exists());
    }

    #[test]
    fn for_each_visits_all_openers() {
        let registry = HandleRegistry::new();
        let _a = registry.register(ctx("/f"));
        let _b = registry.register(ctx("/f"));
        let _c = registry.register(ctx("/other"));

        let mut seen = 0;
        registry.for_each("/f", |_| seen += 1);
        assert_eq!(seen, 2);

        seen = 0;
        registry.for_each("/missing", |_| seen += 1);
        assert_eq!(seen, 0);
    }

    #[test]
    fn rename_context_reindexes_single_context() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        let _other = registry.register(ctx("/a"));

        registry.rename_context(&a, "/b");
        assert_eq!(registry.count("/a"), 1);
        assert_eq!(registry.count("/b"), 1);
        assert_eq!(a.lock().unwrap().path(), "/b");
    }

    #[test]
    fn retarget_moves_every_opener() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/dir/x"));
        let b = registry.register(ctx("/dir/x"));

        registry.retarget("/dir/x", "/dir2/x");
        assert_eq!(registry.count("/dir/x"), 0);
        assert_eq!(registry.count("/dir2/x"), 2);
        assert_eq!(a.lock().unwrap().path(), "/dir2/x");
        assert_eq!(b.lock().unwrap().path(), "/dir2/x");
    }

    #[test]
    fn detach_all_clears_paths_but_keeps_handles() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        registry.detach_all("/a");

        assert_eq!(registry.count("/a"), 0);
        assert!(a.lock().unwrap().is_detached());

        // Still unregisterable after detach.
        registry.unregister(&a);
    }

    #[test]
    fn arm_all_touches_every_context() {
        let registry = HandleRegistry::new();
        let a = registry.register(ctx("/a"));
        let b = registry.register(ctx("/b"));

        assert_eq!(registry.arm_all(), 2);
        assert!(a.lock().unwrap().is_armed());
        assert!(b.lock().unwrap().is_armed());
    }

    #[test]
    fn directory_rename_retargets_open_context() {
        let (_dir, store) = open_store();
        store.create_dir("/dir", "mkdir /dir").unwrap();
        store.commit_bytes("/dir/x", b"1", "create /dir/x", false).unwrap();

        let registry = HandleRegistry::new();
        let (bytes, executable) = store.read_file("/dir/x").unwrap();
        let open = registry.register(OpenContext::new("/dir/x", executable, &bytes).unwrap());

        store
            .rename("/dir", "/dir2", "rename /dir -> /dir2", |old, new| {
                registry.retarget(old, new);
            })
            .unwrap();

        assert_eq!(open.lock().unwrap().path(), "/dir2/x");
        assert!(store.get_attr("/dir2/x").is_ok());
        assert!(matches!(
            store.get_attr("/dir/x"),
            Err(StoreError::NoSuchPath(_))
        ));
    }

    #[test]
    fn last_closer_wins() {
        let (_dir, store) = open_store();
        store.commit_bytes("/f", b"", "create /f", false).unwrap();

        let registry = HandleRegistry::new();
        let first = registry.register(ctx("/f"));
        let second = registry.register(ctx("/f"));

        first.lock().unwrap().write(0, b"first").unwrap();
        second.lock().unwrap().write(0, b"second!").unwrap();

        first.lock().unwrap().commit(&store, "write /f").unwrap();
        registry.unregister(&first);
        second.lock().unwrap().commit(&store, "write /f").unwrap();
        registry.unregister(&second);

        assert_eq!(store.read_file("/f").unwrap().0, b"second!");
    }
}
