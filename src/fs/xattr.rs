//! Extended attributes are not modeled: a known, writeable path silently
//! accepts sets/removes with no state change, and listing/getting always
//! comes back empty. This keeps tools that probe xattrs (tar, rsync -X)
//! from failing outright on a mount that simply has none to offer.

use super::prelude::*;

#[allow(clippy::too_many_arguments)]
pub fn setxattr(
    fs: &mut MuxFs,
    _req: &Request<'_>,
    ino: u64,
    _name: &OsStr,
    _flags: i32,
    _position: u32,
    reply: ReplyEmpty,
) {
    match known_path(fs, ino) {
        Some(_) => reply.ok(),
        None => reply.error(ENOENT),
    }
}

pub fn getxattr(fs: &mut MuxFs, _req: &Request<'_>, ino: u64, _name: &OsStr, size: u32, reply: ReplyXattr) {
    match known_path(fs, ino) {
        Some(_) if size == 0 => reply.size(0),
        Some(_) => reply.data(&[]),
        None => reply.error(ENOENT),
    }
}

pub fn listxattr(fs: &mut MuxFs, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
    match known_path(fs, ino) {
        Some(_) if size == 0 => reply.size(0),
        Some(_) => reply.data(&[]),
        None => reply.error(ENOENT),
    }
}

pub fn removexattr(fs: &mut MuxFs, _req: &Request<'_>, ino: u64, _name: &OsStr, reply: ReplyEmpty) {
    match known_path(fs, ino) {
        Some(_) => reply.ok(),
        None => reply.error(ENOENT),
    }
}

fn known_path(fs: &MuxFs, ino: u64) -> Option<String> {
    let path = fs.path_for_ino(ino)?;
    if path.is_empty() || fs.namespace.is_dir(&path) || fs.namespace.is_file(&path) {
        Some(path)
    } else {
        None
    }
}
