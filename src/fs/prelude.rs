//! Common imports shared by every façade submodule.

pub use std::ffi::OsStr;
pub use std::time::Duration;

pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request,
};
pub use libc::{EACCES, EINVAL, EIO, ENOENT, ENOSYS, ENOTEMPTY};

pub use crate::error::MuxfysError;
pub use crate::namespace::{join, name_of, parent_of, Kind};

pub use super::{MuxFs, OpenHandle, TTL};
