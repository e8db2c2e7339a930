use super::prelude::*;
use crate::cached_file::CachedFile;

#[allow(clippy::too_many_arguments)]
pub fn write(
    fs: &mut MuxFs,
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
    let locks = fs.locks.clone();
    let namespace = fs.namespace.clone();

    match fs.handle(fh) {
        Some(OpenHandle::Cached(cf)) => match cf.write(&locks, &namespace, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.to_errno()),
        },
        Some(OpenHandle::Remote(_)) => reply.error(ENOSYS),
        _ => reply.error(ENOENT),
    }
}

pub fn flush(fs: &mut MuxFs, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
    match fs.handle(fh) {
        Some(OpenHandle::Cached(cf)) => match cf.flush() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        },
        _ => reply.ok(),
    }
}

pub fn release(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    match fs.take_handle(fh) {
        Some(OpenHandle::Cached(cf)) => match cf.release() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        },
        _ => reply.ok(),
    }
}

pub fn create(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    flags: i32,
    reply: ReplyCreate,
) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(binding) = fs.write_binding.clone() else {
        reply.error(EACCES);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = join(&parent_path, name_str);

    let _guard = match fs.locks.acquire(&binding.local_path(&path)) {
        Ok(g) => g,
        Err(err) => {
            reply.error(err.to_errno());
            return;
        }
    };

    fs.namespace.create_file(&path, binding.clone());
    let local = binding.local_path(&path);
    if let Some(dir) = local.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            reply.error(err.raw_os_error().unwrap_or(EIO));
            return;
        }
    }
    if let Err(err) = std::fs::File::create(&local) {
        reply.error(err.raw_os_error().unwrap_or(EIO));
        return;
    }

    let attr = fs.namespace.file_attr(&path).unwrap();
    match CachedFile::open(binding, &fs.locks, &path, attr, flags) {
        Ok(cf) => {
            let ino = fs.ino_for_path(&path);
            let fuse_attr = fs.fuse_attr(ino, attr);
            let fh = fs.alloc_fh(OpenHandle::Cached(cf));
            reply.created(&TTL, &fuse_attr, 0, fh, 0);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

pub fn mkdir(fs: &mut MuxFs, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    if !parent_path.is_empty() && !fs.namespace.is_dir(&parent_path) {
        reply.error(ENOENT);
        return;
    }
    let Some(binding) = fs.write_binding.clone() else {
        reply.error(EACCES);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = join(&parent_path, name_str);

    if binding.cache_data {
        let local = binding.local_path(&path);
        if let Err(err) = std::fs::create_dir_all(&local) {
            reply.error(err.raw_os_error().unwrap_or(EIO));
            return;
        }
    }

    fs.namespace.create_dir(&path, binding);
    let ino = fs.ino_for_path(&path);
    let attr = fs.fuse_attr(ino, crate::namespace::Attr::directory());
    reply.entry(&TTL, &attr, 0);
}
