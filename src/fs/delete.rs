use super::prelude::*;

pub fn unlink(fs: &mut MuxFs, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = join(&parent_path, name_str);

    let Some(binding) = fs.namespace.file_binding(&path) else {
        reply.error(ENOENT);
        return;
    };
    if !binding.writeable {
        reply.error(EACCES);
        return;
    }

    if binding.cache_data {
        let local = binding.local_path(&path);
        if let Ok(_guard) = fs.locks.acquire(&local) {
            if local.exists() {
                let _ = std::fs::remove_file(&local);
            }
            binding.tracker().cache_delete(&local);
        }
    }

    // Best-effort: a failed remote delete is logged but the namespace is
    // scrubbed regardless, since local state must not claim a file exists
    // once we've dropped it from our own view.
    if let Err(err) = binding.delete_file(&path) {
        tracing::warn!(path = path.as_str(), err = %err, "remote delete failed, removing from namespace anyway");
    }

    fs.namespace.remove_file(&path);
    reply.ok();
}

pub fn rmdir(fs: &mut MuxFs, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let Some(parent_path) = fs.path_for_ino(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = join(&parent_path, name_str);

    if !fs.namespace.is_dir(&path) {
        reply.error(ENOENT);
        return;
    }
    let contents = fs.namespace.dir_contents(&path).unwrap_or_default();
    if !contents.is_empty() {
        reply.error(ENOTEMPTY);
        return;
    }

    if let Some(remotes) = fs.namespace.dir_remotes(&path) {
        if let Some(binding) = remotes.first() {
            if binding.cache_data {
                let local = binding.local_path(&path);
                let _ = std::fs::remove_dir(&local);
            }
        }
    }

    fs.namespace.remove_dir(&path);
    reply.ok();
}
