use super::prelude::*;
use crate::binding::RemoteBinding;
use crate::interval::Interval;
use crate::namespace::now_secs;
use std::fs::OpenOptions;

pub fn getattr(fs: &mut MuxFs, _req: &Request, ino: u64, reply: ReplyAttr) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };

    if let Some(found) = resolve_attr(fs, ino, &path) {
        reply.attr(&TTL, &found);
        return;
    }

    // Not yet known: list the parent (triggers a remote listing) and retry
    // once, per the "single stat lists the whole directory" rationale.
    let parent = parent_of(&path);
    if fs.ensure_listed(parent).is_ok() {
        if let Some(found) = resolve_attr(fs, ino, &path) {
            reply.attr(&TTL, &found);
            return;
        }
    }
    reply.error(ENOENT);
}

fn resolve_attr(fs: &MuxFs, ino: u64, path: &str) -> Option<FileAttr> {
    if path.is_empty() {
        return Some(fs.root_attr());
    }
    if fs.confirmed_dir(path) {
        return Some(fs.fuse_attr(ino, crate::namespace::Attr::directory()));
    }
    fs.namespace.file_attr(path).map(|a| fs.fuse_attr(ino, a))
}

#[allow(clippy::too_many_arguments)]
pub fn setattr(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    ino: u64,
    mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
    _atime: Option<fuser::TimeOrNow>,
    mtime: Option<fuser::TimeOrNow>,
    _ctime: Option<std::time::SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<std::time::SystemTime>,
    _chgtime: Option<std::time::SystemTime>,
    _bkuptime: Option<std::time::SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };

    if let Some(new_size) = size {
        if let Err(err) = do_truncate(fs, &path, new_size) {
            reply.error(err.to_errno());
            return;
        }
    }

    if mode.is_some() {
        // chmod silently succeeds if the path is known; no state change.
        if !fs.namespace.is_file(&path) && !fs.namespace.is_dir(&path) && !path.is_empty() {
            reply.error(ENOENT);
            return;
        }
    }

    if let Some(new_mtime) = mtime {
        let secs = match new_mtime {
            fuser::TimeOrNow::SpecificTime(t) => t
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            fuser::TimeOrNow::Now => now_secs(),
        };
        if fs.namespace.is_file(&path) {
            fs.namespace.update_attr(&path, |a| a.mtime = secs);
        } else if !fs.namespace.is_dir(&path) {
            reply.error(ENOENT);
            return;
        }
    }

    match resolve_attr(fs, ino, &path) {
        Some(attr) => reply.attr(&TTL, &attr),
        None => reply.error(ENOENT),
    }
}

fn do_truncate(fs: &MuxFs, path: &str, off: u64) -> crate::error::MuxfysResult<()> {
    let Some(attr) = fs.namespace.file_attr(path) else {
        return Err(MuxfysError::not_found(path));
    };
    if off >= attr.size {
        return Ok(());
    }
    let Some(binding) = fs.namespace.file_binding(path) else {
        return Err(MuxfysError::not_found(path));
    };
    if !binding.cache_data {
        return Err(MuxfysError::not_supported("truncate without a local cache"));
    }

    truncate_cached(&binding, &fs.locks, path, off)?;
    fs.namespace.update_attr(path, |a| {
        a.size = off;
        a.mtime = now_secs();
    });
    fs.namespace.mark_created(path);
    Ok(())
}

fn truncate_cached(
    binding: &RemoteBinding,
    locks: &crate::file_lock::FileLockRegistry,
    rel_path: &str,
    off: u64,
) -> crate::error::MuxfysResult<()> {
    let local = binding.local_path(rel_path);
    let _guard = locks.acquire(&local)?;

    if !local.exists() {
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).open(&local)?;
        file.set_len(off)?;
        drop(file);
        if off > 0 {
            binding.download_range(rel_path, &local, Interval::new(0, off as i64))?;
        }
    } else {
        let file = OpenOptions::new().write(true).open(&local)?;
        file.set_len(off)?;
    }
    binding.tracker().cache_truncate(&local, off as i64);
    Ok(())
}
