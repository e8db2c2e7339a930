//! Symlinks are a cached-mode-only, write-remote-only affair: the link itself
//! lives solely in the local cache directory and the namespace, never
//! uploaded, so it is not added to `created_files`.

use super::prelude::*;

pub fn symlink(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    parent: u64,
    link_name: &OsStr,
    target: &std::path::Path,
    reply: ReplyEntry,
) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(binding) = fs.write_binding.clone() else {
        reply.error(EACCES);
        return;
    };
    if !binding.cache_data {
        reply.error(ENOSYS);
        return;
    }
    let Some(name_str) = link_name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let Some(target_str) = target.to_str() else {
        reply.error(EINVAL);
        return;
    };
    let path = join(&parent_path, name_str);

    let local = binding.local_path(&path);
    if let Some(dir) = local.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            reply.error(err.raw_os_error().unwrap_or(EIO));
            return;
        }
    }
    if let Err(err) = std::os::unix::fs::symlink(target_str, &local) {
        reply.error(err.raw_os_error().unwrap_or(EIO));
        return;
    }

    fs.namespace.create_symlink(&path, binding);
    fs.namespace.update_attr(&path, |a| a.size = target_str.len() as u64);
    let ino = fs.ino_for_path(&path);
    let attr = fs.namespace.file_attr(&path).unwrap();
    let fuse_attr = fs.fuse_attr(ino, attr);
    reply.entry(&TTL, &fuse_attr, 0);
}

pub fn readlink(fs: &mut MuxFs, _req: &Request<'_>, ino: u64, reply: ReplyData) {
    let Some(path) = fs.path_for_ino(ino) else {
        reply.error(ENOENT);
        return;
    };
    let Some(attr) = fs.namespace.file_attr(&path) else {
        reply.error(ENOENT);
        return;
    };
    if attr.kind != Kind::Symlink {
        reply.error(EINVAL);
        return;
    }
    let Some(binding) = fs.namespace.file_binding(&path) else {
        reply.error(ENOENT);
        return;
    };
    let local = binding.local_path(&path);
    match std::fs::read_link(&local) {
        Ok(target) => reply.data(target.to_string_lossy().as_bytes()),
        Err(err) => reply.error(err.raw_os_error().unwrap_or(EIO)),
    }
}
