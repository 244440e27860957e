//! FUSE request dispatch onto the repository store.
//!
//! Each kernel request resolves its inode number to a logical path, calls
//! the corresponding store or handle operation, and maps the result back to
//! a reply or an errno. Open files are addressed by file handle; every
//! handle owns one shared [`OpenContext`].

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, warn};

use snapfs_handles::{HandleRegistry, OpenContext, SharedContext};
use snapfs_store::{FileAttr, GitStore, StoreError};

use crate::inode::{InodeTable, ROOT_INO};

/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

pub struct SnapFs {
    store: Arc<GitStore>,
    registry: Arc<HandleRegistry>,
    inodes: InodeTable,
    handles: HashMap<u64, SharedContext>,
    next_fh: u64,
}

impl SnapFs {
    pub fn new(store: Arc<GitStore>, registry: Arc<HandleRegistry>) -> Self {
        Self {
            store,
            registry,
            inodes: InodeTable::new(),
            handles: HashMap::new(),
            next_fh: 1,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, libc::c_int> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, libc::c_int> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::ENOENT)?;
        Ok(join(&parent_path, name))
    }

    fn context(&self, fh: u64) -> Result<&SharedContext, libc::c_int> {
        self.handles.get(&fh).ok_or(libc::EBADF)
    }

    fn attr_for(&self, ino: u64, path: &str) -> Result<fuser::FileAttr, libc::c_int> {
        let attr = self.store.get_attr(path).map_err(|e| errno(&e))?;
        Ok(fuse_attr(ino, &attr))
    }

    /// Open a context for `path` seeded from the committed blob and hand
    /// back its file handle.
    fn open_context(&mut self, path: &str, seed: &[u8], executable: bool) -> Result<u64, libc::c_int> {
        let ctx = OpenContext::new(path, executable, seed).map_err(io_errno)?;
        let shared = self.registry.register(ctx);
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, shared);
        Ok(fh)
    }

    /// Commit the context behind `fh` if it has dirty content.
    fn commit_handle(&self, fh: u64, verb: &str) -> Result<(), libc::c_int> {
        let ctx = self.context(fh)?;
        let mut guard = ctx.lock().expect("open context lock poisoned");
        let message = format!("{verb} {}", guard.path());
        guard.commit(&self.store, &message).map_err(|e| errno(&e))?;
        Ok(())
    }
}

impl fuser::Filesystem for SnapFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = self.child_path(parent, name).and_then(|path| {
            // Resolve before assigning a number; failed lookups should not
            // grow the inode table.
            let attr = self.store.get_attr(&path).map_err(|e| errno(&e))?;
            let ino = self.inodes.get_or_create(&path);
            Ok(fuse_attr(ino, &attr))
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.path_of(ino).and_then(|path| self.attr_for(ino, &path)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        if let Some(size) = size {
            let message = format!("truncate {path}");
            if let Err(e) = self.store.truncate(&path, size, &message) {
                return reply.error(errno(&e));
            }
            // Open scratch copies follow the committed size.
            self.registry.for_each(&path, |ctx| {
                if let Err(e) = ctx.truncate(size) {
                    warn!(path = ctx.path(), error = %e, "scratch truncate failed");
                }
            });
        }

        if let Some(mode) = mode {
            match self.store.get_attr(&path) {
                Ok(attr) if attr.is_dir() => {
                    // Directory modes are synthetic; nothing to store.
                    debug!(path, "ignoring chmod on directory");
                }
                Ok(_) => {
                    let executable = mode & 0o111 != 0;
                    let message = format!("chmod {path}");
                    if let Err(e) = self.store.chmod(&path, executable, &message) {
                        return reply.error(errno(&e));
                    }
                    self.registry
                        .for_each(&path, |ctx| ctx.set_executable(executable));
                }
                Err(e) => return reply.error(errno(&e)),
            }
        }

        match self.attr_for(ino, &path) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child_path(parent, name).and_then(|path| {
            let message = format!("mkdir {path}");
            self.store
                .create_dir(&path, &message)
                .map_err(|e| errno(&e))?;
            let ino = self.inodes.get_or_create(&path);
            self.attr_for(ino, &path)
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let message = format!("unlink {path}");
        if let Err(e) = self.store.remove_file(&path, &message) {
            return reply.error(errno(&e));
        }
        // Openers keep their scratch copies but can no longer commit.
        self.registry.detach_all(&path);
        self.inodes.forget_path(&path);
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let message = format!("rmdir {path}");
        if let Err(e) = self.store.remove_dir(&path, &message) {
            return reply.error(errno(&e));
        }
        self.inodes.forget_path(&path);
        reply.ok();
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (old, new) = match (
            self.child_path(parent, name),
            self.child_path(newparent, newname),
        ) {
            (Ok(old), Ok(new)) => (old, new),
            (Err(errno), _) | (_, Err(errno)) => return reply.error(errno),
        };
        let message = format!("rename {old} -> {new}");
        let registry = Arc::clone(&self.registry);
        if let Err(e) = self.store.rename(&old, &new, &message, |moved_old, moved_new| {
            registry.retarget(moved_old, moved_new);
        }) {
            return reply.error(errno(&e));
        }
        self.inodes.retarget(&old, &new);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let wants_write = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if wants_write && self.store.config().read_only {
            return reply.error(libc::EROFS);
        }
        let (seed, executable) = match self.store.read_file(&path) {
            Ok(pair) => pair,
            Err(e) => return reply.error(errno(&e)),
        };
        match self.open_context(&path, &seed, executable) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let executable = mode & 0o111 != 0;
        // The empty file is committed immediately so it survives a crash
        // before the first write.
        let message = format!("create {path}");
        if let Err(e) = self.store.commit_bytes(&path, b"", &message, executable) {
            return reply.error(errno(&e));
        }
        let ino = self.inodes.get_or_create(&path);
        let attr = match self.attr_for(ino, &path) {
            Ok(attr) => attr,
            Err(errno) => return reply.error(errno),
        };
        match self.open_context(&path, b"", executable) {
            Ok(fh) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let ctx = match self.context(fh) {
            Ok(ctx) => ctx,
            Err(errno) => return reply.error(errno),
        };
        let guard = ctx.lock().expect("open context lock poisoned");
        match guard.read(offset.max(0) as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(io_errno(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let ctx = match self.context(fh) {
            Ok(ctx) => Arc::clone(ctx),
            Err(errno) => return reply.error(errno),
        };
        let mut guard = ctx.lock().expect("open context lock poisoned");
        let written = match guard.write(offset.max(0) as u64, data) {
            Ok(n) => n,
            Err(e) => return reply.error(io_errno(e)),
        };
        if self.store.config().commit_on_write || guard.is_armed() {
            let message = format!("write {}", guard.path());
            if let Err(e) = guard.commit(&self.store, &message) {
                return reply.error(errno(&e));
            }
        }
        reply.written(written);
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.commit_handle(fh, "flush") {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.commit_handle(fh, "fsync") {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // The handle is gone either way; a failed commit is still reported.
        let committed = self.commit_handle(fh, "close");
        if let Some(ctx) = self.handles.remove(&fh) {
            self.registry.unregister(&ctx);
        }
        match committed {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let children = match self.store.list_dir(&path) {
            Ok(children) => children,
            Err(e) => return reply.error(errno(&e)),
        };

        let parent_ino = match path.rfind('/') {
            Some(0) | None => ROOT_INO,
            Some(cut) => self.inodes.get_or_create(&path[..cut]),
        };
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for child in children {
            let child_path = join(&path, &child.name);
            let child_ino = self.inodes.get_or_create(&child_path);
            let kind = if child.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((child_ino, kind, child.name));
        }

        for (i, (entry_ino, kind, name)) in
            entries.into_iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.path_of(ino).and_then(|path| {
            self.store.get_attr(&path).map_err(|e| errno(&e))
        }) {
            Ok(_) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }
}

/// Join a parent path and a child name into one logical path.
fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Map a store error onto the errno the kernel expects.
fn errno(err: &StoreError) -> libc::c_int {
    match err {
        StoreError::NoSuchPath(_) => libc::ENOENT,
        StoreError::NotADirectory(_) => libc::ENOTDIR,
        StoreError::IsADirectory(_) => libc::EISDIR,
        StoreError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
        // A name the store cannot represent behaves like one that is absent.
        StoreError::NotRepresentable(_) => libc::ENOENT,
        StoreError::AlreadyExists(_) => libc::EEXIST,
        StoreError::ReadOnly => libc::EROFS,
        StoreError::RepositoryUnavailable { .. } | StoreError::StoreOperation { .. } => libc::EIO,
        StoreError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
    }
}

fn io_errno(err: std::io::Error) -> libc::c_int {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// Translate store attributes into the kernel's attribute structure.
///
/// The object store keeps no timestamps; everything reports the epoch and
/// relies on the short attribute TTL instead.
fn fuse_attr(ino: u64, attr: &FileAttr) -> fuser::FileAttr {
    let kind = if attr.is_dir() {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: SystemTime::UNIX_EPOCH,
        mtime: SystemTime::UNIX_EPOCH,
        ctime: SystemTime::UNIX_EPOCH,
        crtime: SystemTime::UNIX_EPOCH,
        kind,
        perm: attr.permissions() as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}
