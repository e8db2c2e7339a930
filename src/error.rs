//! Error kinds surfaced across the crate.
//!
//! The FUSE façade (`fs/`) never constructs raw `libc` error codes directly;
//! every handler returns a `MuxfysError` and the dispatcher in `fs/mod.rs`
//! maps it to an errno with [`MuxfysError::to_errno`].

use std::fmt;

/// The crate-wide `Result` alias.
pub type MuxfysResult<T> = Result<T, MuxfysError>;

#[derive(thiserror::Error, Debug)]
pub enum MuxfysError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to upload {0} files")]
    UploadFailed(usize),
}

impl MuxfysError {
    /// Maps a classified error onto the `libc` errno the kernel expects back
    /// from a FUSE callback. Never called for `UploadFailed`, which only
    /// ever escapes through `Unmount`.
    pub fn to_errno(&self) -> i32 {
        match self {
            MuxfysError::NotFound(_) => libc::ENOENT,
            MuxfysError::PermissionDenied(_) => libc::EACCES,
            MuxfysError::NotSupported(_) => libc::ENOSYS,
            MuxfysError::Io(_) | MuxfysError::Remote(_) => libc::EIO,
            MuxfysError::Config(_) => libc::EINVAL,
            MuxfysError::UploadFailed(_) => libc::EIO,
        }
    }

    pub fn not_found(path: impl fmt::Display) -> Self {
        MuxfysError::NotFound(path.to_string())
    }

    pub fn permission_denied(msg: impl fmt::Display) -> Self {
        MuxfysError::PermissionDenied(msg.to_string())
    }

    pub fn not_supported(msg: impl fmt::Display) -> Self {
        MuxfysError::NotSupported(msg.to_string())
    }

    pub fn config(msg: impl fmt::Display) -> Self {
        MuxfysError::Config(msg.to_string())
    }

    pub fn remote(msg: impl fmt::Display) -> Self {
        MuxfysError::Remote(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_expected_errno() {
        assert_eq!(MuxfysError::not_found("x").to_errno(), libc::ENOENT);
        assert_eq!(MuxfysError::permission_denied("x").to_errno(), libc::EACCES);
        assert_eq!(MuxfysError::not_supported("x").to_errno(), libc::ENOSYS);
        assert_eq!(MuxfysError::remote("x").to_errno(), libc::EIO);
        assert_eq!(
            MuxfysError::Io(std::io::Error::other("x")).to_errno(),
            libc::EIO
        );
    }
}
