//! The FUSE façade: one handler per kernel callback, implementing the
//! multiplex policy and dispatching into the cached-file or remote-file path.
//!
//! [`MuxFs`] owns the inode allocation table the kernel requires; the
//! path-keyed [`crate::namespace::Namespace`] underneath it knows nothing of
//! inode numbers, per the design note that rejects an inode-graph namespace.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuser::{FileAttr, FileType, Filesystem, Request};

use crate::binding::RemoteBinding;
use crate::cached_file::CachedFile;
use crate::error::{MuxfysError, MuxfysResult};
use crate::file_lock::FileLockRegistry;
use crate::namespace::{Attr, Kind, Namespace};
use crate::remote_file::RemoteFile;

pub mod attr;
pub mod create;
pub mod delete;
pub mod prelude;
pub mod read;
pub mod rename;
pub mod symlink;
pub mod xattr;

pub const TTL: Duration = Duration::from_secs(1);
pub const ROOT_INO: u64 = 1;

pub enum OpenHandle {
    Cached(CachedFile),
    Remote(RemoteFile),
    Dir,
}

pub struct MuxFs {
    pub namespace: Arc<Namespace>,
    pub locks: Arc<FileLockRegistry>,
    pub bindings: Vec<Arc<RemoteBinding>>,
    pub write_binding: Option<Arc<RemoteBinding>>,
    pub mount_point: String,
    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,
    next_ino: u64,
    open_files: HashMap<u64, OpenHandle>,
    next_fh: u64,
}

impl MuxFs {
    pub fn new(
        namespace: Arc<Namespace>,
        locks: Arc<FileLockRegistry>,
        bindings: Vec<Arc<RemoteBinding>>,
        mount_point: String,
    ) -> Self {
        let write_binding = bindings.iter().find(|b| b.writeable).cloned();
        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        inode_to_path.insert(ROOT_INO, String::new());
        path_to_inode.insert(String::new(), ROOT_INO);

        MuxFs {
            namespace,
            locks,
            bindings,
            write_binding,
            mount_point,
            inode_to_path,
            path_to_inode,
            next_ino: ROOT_INO + 1,
            open_files: HashMap::new(),
            next_fh: 1,
        }
    }

    pub fn path_for_ino(&self, ino: u64) -> Option<String> {
        self.inode_to_path.get(&ino).cloned()
    }

    pub fn ino_for_path(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.path_to_inode.get(path) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inode_to_path.insert(ino, path.to_string());
        self.path_to_inode.insert(path.to_string(), ino);
        ino
    }

    pub fn alloc_fh(&mut self, handle: OpenHandle) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.open_files.insert(fh, handle);
        fh
    }

    pub fn handle(&self, fh: u64) -> Option<&OpenHandle> {
        self.open_files.get(&fh)
    }

    pub fn handle_mut(&mut self, fh: u64) -> Option<&mut OpenHandle> {
        self.open_files.get_mut(&fh)
    }

    pub fn take_handle(&mut self, fh: u64) -> Option<OpenHandle> {
        self.open_files.remove(&fh)
    }

    /// Lists `path` through every contributing remote if it hasn't been
    /// listed yet this mount. No-op once populated.
    ///
    /// A non-root path advertised by only one of several remotes (a sibling's
    /// listing named it as a directory marker) but whose own listing comes
    /// back empty from every contributing remote is rejected as not-found
    /// rather than registered as a valid, empty directory.
    pub fn ensure_listed(&self, path: &str) -> MuxfysResult<()> {
        if self.namespace.dir_contents(path).is_some() {
            return Ok(());
        }
        let Some(remotes) = self.namespace.dir_remotes(path) else {
            return Err(MuxfysError::not_found(path));
        };

        let mut per_remote = Vec::with_capacity(remotes.len());
        for remote in &remotes {
            let entries = remote.find_objects(path)?;
            per_remote.push((remote.clone(), entries));
        }

        if !path.is_empty() && per_remote.iter().all(|(_, entries)| entries.is_empty()) {
            self.namespace.reject_empty_dir(path);
            return Err(MuxfysError::not_found(path));
        }

        self.namespace.populate_dir(path, per_remote);
        Ok(())
    }

    /// Confirms `path` really is a directory, triggering its first listing
    /// when it's only been advertised so far, rather than trusting the
    /// advertisement on its own (see `ensure_listed`).
    pub fn confirmed_dir(&self, path: &str) -> bool {
        if !self.namespace.is_dir(path) {
            return false;
        }
        if self.namespace.dir_contents(path).is_some() {
            return true;
        }
        self.ensure_listed(path).is_ok() && self.namespace.is_dir(path)
    }

    pub fn fuse_attr(&self, ino: u64, attr: Attr) -> FileAttr {
        let kind = match attr.kind {
            Kind::Regular => FileType::RegularFile,
            Kind::Directory => FileType::Directory,
            Kind::Symlink => FileType::Symlink,
        };
        let epoch = |secs: u64| std::time::UNIX_EPOCH + Duration::from_secs(secs);
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: epoch(attr.atime),
            mtime: epoch(attr.mtime),
            ctime: epoch(attr.ctime),
            crtime: epoch(attr.ctime),
            kind,
            perm: attr.mode() as u16,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            flags: 0,
            blksize: 4096,
        }
    }

    pub fn root_attr(&self) -> FileAttr {
        self.fuse_attr(ROOT_INO, Attr::directory())
    }
}

#[derive(Clone)]
pub struct FsHandle(pub Arc<Mutex<MuxFs>>);

impl Filesystem for FsHandle {
    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: fuser::ReplyEntry) {
        let mut fs = self.0.lock().unwrap();
        read::lookup(&mut fs, req, parent, name, reply);
    }

    fn getattr(&mut self, req: &Request, ino: u64, reply: fuser::ReplyAttr) {
        let mut fs = self.0.lock().unwrap();
        attr::getattr(&mut fs, req, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let mut fs = self.0.lock().unwrap();
        attr::setattr(
            &mut fs, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn opendir(&mut self, req: &Request, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        let mut fs = self.0.lock().unwrap();
        read::opendir(&mut fs, req, ino, flags, reply);
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: fuser::ReplyDirectory) {
        let mut fs = self.0.lock().unwrap();
        read::readdir(&mut fs, req, ino, fh, offset, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        let mut fs = self.0.lock().unwrap();
        read::open(&mut fs, req, ino, flags, reply);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let mut fs = self.0.lock().unwrap();
        read::read(&mut fs, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let mut fs = self.0.lock().unwrap();
        create::write(&mut fs, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: fuser::ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        create::flush(&mut fs, req, ino, fh, lock_owner, reply);
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        create::release(&mut fs, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let mut fs = self.0.lock().unwrap();
        create::create(&mut fs, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: fuser::ReplyEntry) {
        let mut fs = self.0.lock().unwrap();
        create::mkdir(&mut fs, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: fuser::ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::unlink(&mut fs, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: fuser::ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::rmdir(&mut fs, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        rename::rename(&mut fs, req, parent, name, newparent, newname, flags, reply);
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &std::path::Path,
        reply: fuser::ReplyEntry,
    ) {
        let mut fs = self.0.lock().unwrap();
        symlink::symlink(&mut fs, req, parent, link_name, target, reply);
    }

    fn readlink(&mut self, req: &Request<'_>, ino: u64, reply: fuser::ReplyData) {
        let mut fs = self.0.lock().unwrap();
        symlink::readlink(&mut fs, req, ino, reply);
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        _value: &[u8],
        flags: i32,
        position: u32,
        reply: fuser::ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        xattr::setxattr(&mut fs, req, ino, name, flags, position, reply);
    }

    fn getxattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: fuser::ReplyXattr) {
        let mut fs = self.0.lock().unwrap();
        xattr::getxattr(&mut fs, req, ino, name, size, reply);
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: fuser::ReplyXattr) {
        let mut fs = self.0.lock().unwrap();
        xattr::listxattr(&mut fs, req, ino, size, reply);
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: fuser::ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        xattr::removexattr(&mut fs, req, ino, name, reply);
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        const PB_IN_BLOCKS: u64 = (1u64 << 50) / 4096;
        reply.statfs(PB_IN_BLOCKS, PB_IN_BLOCKS, PB_IN_BLOCKS, 1_000_000_000, 1_000_000_000, 4096, 255, 4096);
    }

    fn access(&mut self, _req: &Request<'_>, _ino: u64, _mask: i32, reply: fuser::ReplyEmpty) {
        reply.ok();
    }
}
