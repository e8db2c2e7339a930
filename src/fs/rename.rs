use super::prelude::*;

#[allow(clippy::too_many_arguments)]
pub fn rename(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let (Some(parent_path), Some(new_parent_path)) =
        (fs.path_for_ino(parent), fs.path_for_ino(newparent))
    else {
        reply.error(ENOENT);
        return;
    };
    let (Some(name_str), Some(newname_str)) = (name.to_str(), newname.to_str()) else {
        reply.error(ENOENT);
        return;
    };
    let old = join(&parent_path, name_str);
    let new = join(&new_parent_path, newname_str);

    if fs.namespace.is_dir(&old) {
        rename_dir(fs, &old, &new, &new_parent_path, reply);
    } else if fs.namespace.is_file(&old) {
        rename_file(fs, &old, &new, reply);
    } else {
        reply.error(ENOENT);
    }
}

fn rename_dir(fs: &mut MuxFs, old: &str, new: &str, new_parent: &str, reply: ReplyEmpty) {
    if !fs.namespace.is_created_dir(old) {
        reply.error(ENOSYS);
        return;
    }
    if !new_parent.is_empty() && !fs.namespace.is_dir(new_parent) {
        reply.error(ENOENT);
        return;
    }

    if let Some(remotes) = fs.namespace.dir_remotes(old) {
        if let Some(binding) = remotes.first() {
            if binding.cache_data {
                let old_local = binding.local_path(old);
                let new_local = binding.local_path(new);
                if let Some(parent) = new_local.parent() {
                    if let Err(err) = std::fs::create_dir_all(parent) {
                        reply.error(err.raw_os_error().unwrap_or(EIO));
                        return;
                    }
                }
                if old_local.exists() {
                    if let Err(err) = std::fs::rename(&old_local, &new_local) {
                        reply.error(err.raw_os_error().unwrap_or(EIO));
                        return;
                    }
                }
            }
        }
    }

    fs.namespace.rename_dir(old, new);
    reply.ok();
}

fn rename_file(fs: &mut MuxFs, old: &str, new: &str, reply: ReplyEmpty) {
    let Some(binding) = fs.namespace.file_binding(old) else {
        reply.error(ENOENT);
        return;
    };
    if !binding.writeable {
        reply.error(EACCES);
        return;
    }

    if let Err(err) = binding.copy_file(old, new) {
        reply.error(err.to_errno());
        return;
    }

    if binding.cache_data {
        let old_local = binding.local_path(old);
        let new_local = binding.local_path(new);
        if old_local.exists() {
            if let Some(parent) = new_local.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::rename(&old_local, &new_local);
        }
        binding.tracker().cache_rename(&old_local, &new_local);
    }

    fs.namespace.rename_file(old, new);

    if let Err(err) = binding.delete_file(old) {
        tracing::warn!(path = old, err = %err, "post-rename remote delete of old key failed");
    }
    reply.ok();
}
