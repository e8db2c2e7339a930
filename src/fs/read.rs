use super::prelude::*;
use crate::cached_file::CachedFile;
use crate::remote_file::RemoteFile;

pub fn lookup(fs: &mut MuxFs, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    if fs.ensure_listed(&parent_path).is_err() {
        reply.error(ENOENT);
        return;
    }

    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let child = join(&parent_path, name_str);

    if fs.confirmed_dir(&child) {
        let ino = fs.ino_for_path(&child);
        let attr = fs.fuse_attr(ino, crate::namespace::Attr::directory());
        reply.entry(&TTL, &attr, 0);
        return;
    }
    if let Some(a) = fs.namespace.file_attr(&child) {
        let ino = fs.ino_for_path(&child);
        let attr = fs.fuse_attr(ino, a);
        reply.entry(&TTL, &attr, 0);
        return;
    }
    reply.error(ENOENT);
}

pub fn opendir(fs: &mut MuxFs, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };
    if !path.is_empty() && !fs.confirmed_dir(&path) {
        reply.error(ENOENT);
        return;
    }
    let fh = fs.alloc_fh(OpenHandle::Dir);
    reply.opened(fh, 0);
}

pub fn readdir(fs: &mut MuxFs, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };
    if fs.ensure_listed(&path).is_err() {
        reply.error(ENOENT);
        return;
    }

    let parent_ino = if path.is_empty() {
        super::ROOT_INO
    } else {
        fs.ino_for_path(parent_of(&path))
    };

    let mut rows: Vec<(u64, FileType, String)> = vec![
        (ino, FileType::Directory, ".".to_string()),
        (parent_ino, FileType::Directory, "..".to_string()),
    ];

    let entries = fs.namespace.dir_contents(&path).unwrap_or_default();
    for entry in entries {
        let child = join(&path, &entry.name);
        let child_ino = fs.ino_for_path(&child);
        let kind = match entry.kind {
            Kind::Directory => FileType::Directory,
            Kind::Symlink => FileType::Symlink,
            Kind::Regular => FileType::RegularFile,
        };
        rows.push((child_ino, kind, entry.name));
    }

    for (i, (child_ino, kind, name)) in rows.into_iter().enumerate().skip(offset as usize) {
        if reply.add(child_ino, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

pub fn open(fs: &mut MuxFs, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };
    let Some(attr) = fs.namespace.file_attr(&path) else {
        reply.error(ENOENT);
        return;
    };
    let Some(binding) = fs.namespace.file_binding(&path) else {
        reply.error(ENOENT);
        return;
    };

    let write_requested = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
    if write_requested && !binding.writeable {
        reply.error(EACCES);
        return;
    }

    if !binding.cache_data {
        if write_requested {
            reply.error(ENOSYS);
            return;
        }
        match RemoteFile::open(binding, &path) {
            Ok(rf) => {
                let fh = fs.alloc_fh(OpenHandle::Remote(rf));
                reply.opened(fh, 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
        return;
    }

    match CachedFile::open(binding.clone(), &fs.locks, &path, attr, flags) {
        Ok(cf) => {
            if write_requested {
                if flags & libc::O_APPEND == 0 {
                    let local = binding.local_path(&path);
                    binding.tracker().cache_truncate(&local, 0);
                    fs.namespace.update_attr(&path, |a| a.size = 0);
                }
                fs.namespace.mark_created(&path);
            }
            let fh = fs.alloc_fh(OpenHandle::Cached(cf));
            reply.opened(fh, 0);
        }
        Err(err) => reply.error(err.to_errno()),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn read(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    ino: u64,
    fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };
    let locks = fs.locks.clone();
    let attr = fs.namespace.file_attr(&path);

    match fs.handle_mut(fh) {
        Some(OpenHandle::Cached(cf)) => {
            let Some(attr) = attr else {
                reply.error(ENOENT);
                return;
            };
            match cf.read(&locks, offset, size, attr) {
                Ok(bytes) => reply.data(&bytes),
                Err(err) => reply.error(err.to_errno()),
            }
        }
        Some(OpenHandle::Remote(rf)) => match rf.read(offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(err) => reply.error(err.to_errno()),
        },
        _ => reply.error(ENOENT),
    }
}
