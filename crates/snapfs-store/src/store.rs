//! The repository-backed store: attribute/listing reads and commit-producing
//! mutations.
//!
//! Every mutator follows the same sequence: resolve the current `HEAD` tree,
//! stage changes into a fresh in-memory copy of the index, write the
//! resulting tree, and create a commit whose sole parent is the previous
//! `HEAD`. An uncommitted stage is simply discarded on error, so callers
//! never observe a half-applied mutation.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use git2::{ObjectType, TreeWalkMode, TreeWalkResult};
use tracing::{debug, info};

use snapfs_path::{demangle, mangle, PLACEHOLDER};

use crate::attr::{FileAttr, Ownership, MODE_FILE, MODE_FILE_EXEC};
use crate::config::FsConfig;
use crate::error::{StoreError, StoreResult};
use crate::lock::RepoLock;

const COMMITTER_NAME: &str = "snapfs";
const COMMITTER_EMAIL: &str = "snapfs@localhost";

/// Identity of the commit currently at `HEAD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub message: String,
}

/// A bare git repository serving as the filesystem's object store.
pub struct GitStore {
    repo: RepoLock,
    config: FsConfig,
    owner: Ownership,
}

impl GitStore {
    /// Open the bare repository at `path`, initializing it (with an empty
    /// initial commit, so `HEAD` always resolves) if it does not exist yet.
    pub fn open(path: &Path, config: FsConfig) -> StoreResult<Self> {
        let repo = match git2::Repository::open_bare(path) {
            Ok(repo) => repo,
            Err(open_err) => match git2::Repository::init_bare(path) {
                Ok(repo) => repo,
                Err(init_err) => {
                    return Err(StoreError::RepositoryUnavailable {
                        path: path.to_path_buf(),
                        reason: format!(
                            "open failed ({}); init failed ({})",
                            open_err.message(),
                            init_err.message()
                        ),
                    })
                }
            },
        };

        if repo.head().is_err() {
            initial_commit(&repo).map_err(|e| StoreError::RepositoryUnavailable {
                path: path.to_path_buf(),
                reason: format!("initial commit failed ({})", e.message()),
            })?;
        }

        // Per-file ownership is not recorded in the object store; attribute
        // queries report the repository directory's own uid/gid instead.
        let meta = std::fs::metadata(path)?;
        let owner = Ownership {
            uid: meta.uid(),
            gid: meta.gid(),
        };

        info!(path = %path.display(), read_only = config.read_only, "opened repository");
        Ok(Self {
            repo: RepoLock::new(repo),
            config,
            owner,
        })
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Identity and parents of the commit at `HEAD`.
    pub fn head_info(&self) -> StoreResult<CommitInfo> {
        let repo = self.repo.read();
        let commit = repo.head()?.peel_to_commit()?;
        Ok(CommitInfo {
            id: commit.id().to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
            message: commit.message().unwrap_or_default().to_string(),
        })
    }

    /// List the immediate children of the directory at `path`.
    ///
    /// Entries whose stored names do not demangle -- the reserved placeholder
    /// included -- are omitted from the result.
    pub fn list_dir(&self, path: &str) -> StoreResult<Vec<FileAttr>> {
        let repo = self.repo.read();
        let root = head_tree(&repo)?;

        // The root is the whole tree, not an entry of it.
        let tree = if path == "/" {
            root
        } else {
            let rel = store_rel(path);
            let entry = entry_at(&root, &rel, path)?;
            if entry.kind() != Some(ObjectType::Tree) {
                return Err(StoreError::NotADirectory(path.to_string()));
            }
            repo.find_tree(entry.id())?
        };

        // One-level pre-order walk: signal "skip subtree" for every
        // directory so only the top of each child is entered.
        let mut raw: Vec<(String, git2::Oid, i32, bool)> = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |_parent, entry| {
            let is_tree = entry.kind() == Some(ObjectType::Tree);
            if let Some(name) = entry.name() {
                raw.push((name.to_string(), entry.id(), entry.filemode(), is_tree));
            }
            if is_tree {
                TreeWalkResult::Skip
            } else {
                TreeWalkResult::Ok
            }
        })?;

        let mut entries = Vec::with_capacity(raw.len());
        for (store_name, oid, filemode, is_tree) in raw {
            let name = match demangle(&store_name) {
                Ok(name) => name,
                Err(_) => continue,
            };
            if is_tree {
                entries.push(FileAttr::directory(name, self.owner));
            } else {
                let size = repo.find_blob(oid)?.size() as u64;
                entries.push(FileAttr::file(name, filemode as u32, size, self.owner));
            }
        }
        Ok(entries)
    }

    /// Attributes of the entry at `path`.
    pub fn get_attr(&self, path: &str) -> StoreResult<FileAttr> {
        let repo = self.repo.read();
        if path == "/" {
            return Ok(FileAttr::directory("/", self.owner));
        }
        let root = head_tree(&repo)?;
        let rel = store_rel(path);
        let entry = entry_at(&root, &rel, path)?;
        match entry.kind() {
            Some(ObjectType::Tree) => Ok(FileAttr::directory(leaf_name(path), self.owner)),
            Some(ObjectType::Blob) => {
                let size = repo.find_blob(entry.id())?.size() as u64;
                Ok(FileAttr::file(
                    leaf_name(path),
                    entry.filemode() as u32,
                    size,
                    self.owner,
                ))
            }
            _ => Err(StoreError::NoSuchPath(path.to_string())),
        }
    }

    /// Committed content and executable flag of the file at `path`.
    pub fn read_file(&self, path: &str) -> StoreResult<(Vec<u8>, bool)> {
        let repo = self.repo.read();
        if path == "/" {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let root = head_tree(&repo)?;
        let rel = store_rel(path);
        let entry = entry_at(&root, &rel, path)?;
        if entry.kind() == Some(ObjectType::Tree) {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let blob = repo.find_blob(entry.id())?;
        let executable = entry.filemode() as u32 == MODE_FILE_EXEC;
        Ok((blob.content().to_vec(), executable))
    }

    /// Commit `bytes` at `path` with the requested executable bit.
    ///
    /// The single atomic unit of mutation; every higher-level mutator
    /// funnels through the same stage-then-commit sequence.
    pub fn commit_bytes(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        executable: bool,
    ) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        let blob_id = repo.blob(bytes)?;
        let mut index = staged_index(&repo)?;
        let rel = store_rel(path);
        let mode = if executable { MODE_FILE_EXEC } else { MODE_FILE };
        index.add(&index_entry(&rel, blob_id, mode, bytes.len() as u32))?;
        debug!(path, len = bytes.len(), executable, "commit");
        commit_staged(&repo, &mut index, message)
    }

    /// Commit the current content of `scratch` at `path`.
    pub fn commit_file(
        &self,
        path: &str,
        scratch: &Path,
        message: &str,
        executable: bool,
    ) -> StoreResult<()> {
        let bytes = std::fs::read(scratch)?;
        self.commit_bytes(path, &bytes, message, executable)
    }

    /// Remove the file entry at `path`.
    pub fn remove_file(&self, path: &str, message: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        if path == "/" {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let root = head_tree(&repo)?;
        let rel = store_rel(path);
        let entry = entry_at(&root, &rel, path)?;
        if entry.kind() == Some(ObjectType::Tree) {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let mut index = staged_index(&repo)?;
        index.remove(Path::new(&rel), 0)?;
        debug!(path, "unlink");
        commit_staged(&repo, &mut index, message)
    }

    /// Create the directory at `path` by committing its placeholder entry.
    pub fn create_dir(&self, path: &str, message: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        let rel = store_rel(path);
        if rel.is_empty() {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        let root = head_tree(&repo)?;
        if root.get_path(Path::new(&rel)).is_ok() {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        let blob_id = repo.blob(b"")?;
        let mut index = staged_index(&repo)?;
        let keep = format!("{rel}/{PLACEHOLDER}");
        index.add(&index_entry(&keep, blob_id, MODE_FILE, 0))?;
        debug!(path, "mkdir");
        commit_staged(&repo, &mut index, message)
    }

    /// Remove the directory at `path`.
    ///
    /// Fails with `DirectoryNotEmpty` if any representable entry remains;
    /// the reserved placeholder does not count.
    pub fn remove_dir(&self, path: &str, message: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        let rel = store_rel(path);
        if rel.is_empty() {
            return Err(StoreError::DirectoryNotEmpty(path.to_string()));
        }
        let root = head_tree(&repo)?;
        let entry = entry_at(&root, &rel, path)?;
        if entry.kind() != Some(ObjectType::Tree) {
            return Err(StoreError::NotADirectory(path.to_string()));
        }
        let tree = repo.find_tree(entry.id())?;
        for child in tree.iter() {
            let name = child.name().unwrap_or_default();
            if demangle(name).is_ok() {
                return Err(StoreError::DirectoryNotEmpty(path.to_string()));
            }
        }

        let mut index = staged_index(&repo)?;
        let prefix = format!("{rel}/");
        let doomed: Vec<String> = index
            .iter()
            .filter_map(|e| String::from_utf8(e.path).ok())
            .filter(|p| p.starts_with(&prefix))
            .collect();
        for p in &doomed {
            index.remove(Path::new(p), 0)?;
        }
        debug!(path, removed = doomed.len(), "rmdir");
        commit_staged(&repo, &mut index, message)
    }

    /// Replace the blob at `path` with its first `size` bytes, zero-padding
    /// when growing. The replaced entry's mode is preserved.
    pub fn truncate(&self, path: &str, size: u64, message: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        if path == "/" {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let root = head_tree(&repo)?;
        let rel = store_rel(path);
        let entry = entry_at(&root, &rel, path)?;
        if entry.kind() == Some(ObjectType::Tree) {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let mut bytes = repo.find_blob(entry.id())?.content().to_vec();
        bytes.resize(size as usize, 0);
        let blob_id = repo.blob(&bytes)?;
        let mut index = staged_index(&repo)?;
        index.add(&index_entry(
            &rel,
            blob_id,
            entry.filemode() as u32,
            bytes.len() as u32,
        ))?;
        debug!(path, size, "truncate");
        commit_staged(&repo, &mut index, message)
    }

    /// Re-stage the same blob at `path` with an updated executable bit.
    pub fn chmod(&self, path: &str, executable: bool, message: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        let repo = self.repo.write();
        if path == "/" {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let root = head_tree(&repo)?;
        let rel = store_rel(path);
        let entry = entry_at(&root, &rel, path)?;
        if entry.kind() == Some(ObjectType::Tree) {
            return Err(StoreError::IsADirectory(path.to_string()));
        }
        let size = repo.find_blob(entry.id())?.size() as u32;
        let mode = if executable { MODE_FILE_EXEC } else { MODE_FILE };
        let mut index = staged_index(&repo)?;
        index.add(&index_entry(&rel, entry.id(), mode, size))?;
        debug!(path, executable, "chmod");
        commit_staged(&repo, &mut index, message)
    }

    /// Move the entry at `old` (and, for a directory, its whole subtree) to
    /// `new` inside one commit.
    ///
    /// `on_moved` is invoked with the logical (demangled) old and new path
    /// of every individually moved entry before the commit lands, so open
    /// handles can be retargeted. Retargeting is best-effort: a failure
    /// partway through does not roll back callbacks already made.
    pub fn rename<F>(&self, old: &str, new: &str, message: &str, mut on_moved: F) -> StoreResult<()>
    where
        F: FnMut(&str, &str),
    {
        self.ensure_writable()?;
        let repo = self.repo.write();
        let old_rel = store_rel(old);
        let new_rel = store_rel(new);
        if old_rel.is_empty() || new_rel.is_empty() {
            return Err(StoreError::IsADirectory("/".to_string()));
        }

        struct Moved {
            old_store: String,
            new_store: String,
            id: git2::Oid,
            mode: u32,
            size: u32,
        }

        // Enumerate matching entries against a stable snapshot first; the
        // live index is never queried mid-mutation.
        let mut index = staged_index(&repo)?;
        let dir_prefix = format!("{old_rel}/");
        let mut moves: Vec<Moved> = Vec::new();
        for entry in index.iter() {
            let path = match String::from_utf8(entry.path.clone()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let renamed = if path == old_rel {
                new_rel.clone()
            } else if path.starts_with(&dir_prefix) {
                format!("{new_rel}/{}", &path[dir_prefix.len()..])
            } else {
                continue;
            };
            moves.push(Moved {
                old_store: path,
                new_store: renamed,
                id: entry.id,
                mode: entry.mode,
                size: entry.file_size,
            });
        }
        if moves.is_empty() {
            return Err(StoreError::NoSuchPath(old.to_string()));
        }

        for mv in &moves {
            index.remove(Path::new(&mv.old_store), 0)?;
            index.add(&index_entry(&mv.new_store, mv.id, mv.mode, mv.size))?;
            let old_logical = demangle(&format!("/{}", mv.old_store));
            let new_logical = demangle(&format!("/{}", mv.new_store));
            // Placeholder entries have no logical path and no open handles.
            if let (Ok(o), Ok(n)) = (old_logical, new_logical) {
                on_moved(&o, &n);
            }
        }
        debug!(old, new, moved = moves.len(), "rename");
        commit_staged(&repo, &mut index, message)
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("config", &self.config)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Strip the leading slash off a mangled logical path. The result is the
/// path of the corresponding index entry; empty for the root.
fn store_rel(path: &str) -> String {
    let mangled = mangle(path);
    match mangled.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => mangled,
    }
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn head_tree<'r>(repo: &'r git2::Repository) -> StoreResult<git2::Tree<'r>> {
    let obj = repo.revparse_single("HEAD^{tree}")?;
    Ok(obj.peel_to_tree()?)
}

fn entry_at(
    root: &git2::Tree<'_>,
    rel: &str,
    logical: &str,
) -> StoreResult<git2::TreeEntry<'static>> {
    root.get_path(Path::new(rel)).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            StoreError::NoSuchPath(logical.to_string())
        } else {
            e.into()
        }
    })
}

/// A fresh in-memory index seeded from the current `HEAD` tree.
fn staged_index(repo: &git2::Repository) -> StoreResult<git2::Index> {
    let tree = head_tree(repo)?;
    let mut index = git2::Index::new()?;
    index.read_tree(&tree)?;
    Ok(index)
}

/// Write the staged tree and advance `HEAD` by one commit whose sole parent
/// is the previous `HEAD`.
fn commit_staged(
    repo: &git2::Repository,
    index: &mut git2::Index,
    message: &str,
) -> StoreResult<()> {
    let tree_id = index.write_tree_to(repo)?;
    let tree = repo.find_tree(tree_id)?;
    let parent = repo.head()?.peel_to_commit()?;
    let sig = git2::Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)?;
    let commit_id = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
    debug!(commit = %commit_id, "advanced HEAD");
    Ok(())
}

fn initial_commit(repo: &git2::Repository) -> Result<(), git2::Error> {
    let mut index = git2::Index::new()?;
    let tree_id = index.write_tree_to(repo)?;
    let tree = repo.find_tree(tree_id)?;
    let sig = git2::Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)?;
    repo.commit(Some("HEAD"), &sig, &sig, "initialize repository", &tree, &[])?;
    Ok(())
}

fn index_entry(rel: &str, id: git2::Oid, mode: u32, size: u32) -> git2::IndexEntry {
    git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode,
        uid: 0,
        gid: 0,
        file_size: size,
        id,
        flags: 0,
        flags_extended: 0,
        path: rel.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::MODE_DIR;

    fn open_store() -> (tempfile::TempDir, GitStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GitStore::open(&dir.path().join("repo.git"), FsConfig::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn open_initializes_head() {
        let (_dir, store) = open_store();
        let head = store.head_info().unwrap();
        assert!(head.parents.is_empty());
        assert_eq!(head.message, "initialize repository");
        assert!(store.list_dir("/").unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.git");
        let store = GitStore::open(&path, FsConfig::default()).unwrap();
        store.commit_bytes("/a", b"hi", "create /a", false).unwrap();
        let head = store.head_info().unwrap();
        drop(store);

        let store = GitStore::open(&path, FsConfig::default()).unwrap();
        assert_eq!(store.head_info().unwrap(), head);
        assert_eq!(store.read_file("/a").unwrap().0, b"hi");
    }

    #[test]
    fn open_fails_on_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-repo");
        std::fs::write(&path, b"plain file").unwrap();
        let err = GitStore::open(&path, FsConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::RepositoryUnavailable { .. }));
    }

    #[test]
    fn commit_then_stat_and_list() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"hi", "create /a", false).unwrap();

        let attr = store.get_attr("/a").unwrap();
        assert_eq!(attr.name, "a");
        assert_eq!(attr.size, 2);
        assert!(!attr.is_dir());

        let listing = store.list_dir("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "a");
    }

    #[test]
    fn every_mutation_extends_the_commit_chain() {
        let (_dir, store) = open_store();
        let before = store.head_info().unwrap();
        store.commit_bytes("/a", b"one", "create /a", false).unwrap();
        let after = store.head_info().unwrap();
        assert_eq!(after.parents, vec![before.id.clone()]);

        store.truncate("/a", 1, "truncate /a").unwrap();
        let third = store.head_info().unwrap();
        assert_eq!(third.parents, vec![after.id]);
    }

    #[test]
    fn get_attr_missing_path() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.get_attr("/ghost"),
            Err(StoreError::NoSuchPath(_))
        ));
    }

    #[test]
    fn get_attr_root_is_synthetic() {
        let (_dir, store) = open_store();
        let attr = store.get_attr("/").unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.mode, MODE_DIR);
    }

    #[test]
    fn list_dir_on_file_fails() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"x", "create /a", false).unwrap();
        assert!(matches!(
            store.list_dir("/a"),
            Err(StoreError::NotADirectory(_))
        ));
        assert!(matches!(
            store.list_dir("/missing"),
            Err(StoreError::NoSuchPath(_))
        ));
    }

    #[test]
    fn read_file_reports_executable_bit() {
        let (_dir, store) = open_store();
        store.commit_bytes("/run", b"#!/bin/sh", "create /run", true).unwrap();
        let (bytes, executable) = store.read_file("/run").unwrap();
        assert_eq!(bytes, b"#!/bin/sh");
        assert!(executable);
    }

    #[test]
    fn empty_directory_is_representable_and_lists_empty() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();

        let attr = store.get_attr("/d").unwrap();
        assert!(attr.is_dir());
        // The placeholder keeps the directory alive but never shows up.
        assert!(store.list_dir("/d").unwrap().is_empty());

        let listing = store.list_dir("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].is_dir());
    }

    #[test]
    fn create_dir_twice_fails() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();
        assert!(matches!(
            store.create_dir("/d", "mkdir /d"),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn user_file_named_like_placeholder_is_distinct() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();
        store
            .commit_bytes("/d/.keep", b"user data", "create /d/.keep", false)
            .unwrap();

        let listing = store.list_dir("/d").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, ".keep");
        assert_eq!(listing[0].size, 9);
    }

    #[test]
    fn remove_dir_requires_empty() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();
        store.commit_bytes("/d/x", b"1", "create /d/x", false).unwrap();

        assert!(matches!(
            store.remove_dir("/d", "rmdir /d"),
            Err(StoreError::DirectoryNotEmpty(_))
        ));

        store.remove_file("/d/x", "unlink /d/x").unwrap();
        store.remove_dir("/d", "rmdir /d").unwrap();
        assert!(matches!(
            store.get_attr("/d"),
            Err(StoreError::NoSuchPath(_))
        ));
    }

    #[test]
    fn remove_dir_on_file_fails() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"x", "create /a", false).unwrap();
        assert!(matches!(
            store.remove_dir("/a", "rmdir /a"),
            Err(StoreError::NotADirectory(_))
        ));
    }

    #[test]
    fn remove_file_on_dir_fails() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();
        assert!(matches!(
            store.remove_file("/d", "unlink /d"),
            Err(StoreError::IsADirectory(_))
        ));
    }

    #[test]
    fn truncate_shrinks_keeps_prefix() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"hello", "create /a", false).unwrap();
        store.truncate("/a", 2, "truncate /a").unwrap();
        assert_eq!(store.read_file("/a").unwrap().0, b"he");
    }

    #[test]
    fn truncate_grows_with_zero_padding() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"hi", "create /a", false).unwrap();
        store.truncate("/a", 4, "truncate /a").unwrap();
        assert_eq!(store.read_file("/a").unwrap().0, b"hi\0\0");
    }

    #[test]
    fn truncate_to_same_size_keeps_content() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"same", "create /a", false).unwrap();
        store.truncate("/a", 4, "truncate /a").unwrap();
        assert_eq!(store.read_file("/a").unwrap().0, b"same");
    }

    #[test]
    fn truncate_preserves_executable_bit() {
        let (_dir, store) = open_store();
        store.commit_bytes("/run", b"#!/bin/sh\n", "create /run", true).unwrap();
        store.truncate("/run", 3, "truncate /run").unwrap();
        let (bytes, executable) = store.read_file("/run").unwrap();
        assert_eq!(bytes, b"#!/");
        assert!(executable);
    }

    #[test]
    fn chmod_toggles_mode_without_touching_content() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"data", "create /a", false).unwrap();
        store.chmod("/a", true, "chmod /a").unwrap();
        let (bytes, executable) = store.read_file("/a").unwrap();
        assert_eq!(bytes, b"data");
        assert!(executable);

        store.chmod("/a", false, "chmod /a").unwrap();
        assert!(!store.read_file("/a").unwrap().1);
    }

    #[test]
    fn rename_file_moves_single_entry() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"x", "create /a", false).unwrap();

        let mut moved = Vec::new();
        store
            .rename("/a", "/b", "rename /a -> /b", |o, n| {
                moved.push((o.to_string(), n.to_string()));
            })
            .unwrap();

        assert_eq!(moved, vec![("/a".to_string(), "/b".to_string())]);
        assert!(matches!(
            store.get_attr("/a"),
            Err(StoreError::NoSuchPath(_))
        ));
        assert_eq!(store.read_file("/b").unwrap().0, b"x");
    }

    #[test]
    fn rename_directory_moves_subtree_in_one_commit() {
        let (_dir, store) = open_store();
        store.create_dir("/d", "mkdir /d").unwrap();
        store.commit_bytes("/d/x", b"1", "create /d/x", false).unwrap();
        store.commit_bytes("/d/y", b"22", "create /d/y", false).unwrap();

        let before = store.head_info().unwrap();
        let mut moved = Vec::new();
        store
            .rename("/d", "/e", "rename /d -> /e", |o, n| {
                moved.push((o.to_string(), n.to_string()));
            })
            .unwrap();

        // One commit for the whole subtree.
        let after = store.head_info().unwrap();
        assert_eq!(after.parents, vec![before.id]);

        // The placeholder moves too but never reaches the callback.
        moved.sort();
        assert_eq!(
            moved,
            vec![
                ("/d/x".to_string(), "/e/x".to_string()),
                ("/d/y".to_string(), "/e/y".to_string()),
            ]
        );

        assert!(matches!(
            store.get_attr("/d/x"),
            Err(StoreError::NoSuchPath(_))
        ));
        assert_eq!(store.read_file("/e/x").unwrap().0, b"1");
        assert_eq!(store.read_file("/e/y").unwrap().0, b"22");
    }

    #[test]
    fn rename_missing_source_fails() {
        let (_dir, store) = open_store();
        let err = store.rename("/nope", "/else", "rename", |_, _| {}).unwrap_err();
        assert!(matches!(err, StoreError::NoSuchPath(_)));
    }

    #[test]
    fn read_only_store_rejects_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.git");
        // Initialize writable first so HEAD exists.
        GitStore::open(&path, FsConfig::default()).unwrap();

        let config = FsConfig {
            read_only: true,
            ..FsConfig::default()
        };
        let store = GitStore::open(&path, config).unwrap();
        assert!(matches!(
            store.commit_bytes("/a", b"x", "create /a", false),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            store.create_dir("/d", "mkdir /d"),
            Err(StoreError::ReadOnly)
        ));
        // Reads still work.
        assert!(store.list_dir("/").unwrap().is_empty());
    }

    #[test]
    fn overwrite_updates_content() {
        let (_dir, store) = open_store();
        store.commit_bytes("/a", b"first", "create /a", false).unwrap();
        store.commit_bytes("/a", b"second", "write /a", false).unwrap();
        assert_eq!(store.read_file("/a").unwrap().0, b"second");
        assert_eq!(store.get_attr("/a").unwrap().size, 6);
    }
}
