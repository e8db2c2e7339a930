//! The polymorphic contract every remote target speaks, and its two
//! implementations: [`s3::S3Accessor`] for production S3-compatible buckets,
//! and [`local::LocalAccessor`], a filesystem-backed test double standing in
//! for a bucket during tests.

pub mod local;
pub mod s3;

use std::path::{Path, PathBuf};

use crate::error::MuxfysResult;

/// A single entry returned by [`RemoteAccessor::list_entries`]. Directory-like
/// keys have `name` ending in `/`.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub size: i64,
    pub mtime: i64,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// An open, seekable handle to the body of a remote object, positioned at
/// some offset into the object.
pub trait RemoteStream: std::io::Read + Send {
    /// Repositions the stream to `offset`. May be implemented by discarding
    /// and re-opening the underlying transport (e.g. a fresh ranged GET).
    fn seek_to(&mut self, offset: i64) -> MuxfysResult<()>;
}

/// The capability set the rest of the system depends on. Never named
/// directly outside [`crate::binding`]; downstream code only ever sees a
/// `Box<dyn RemoteAccessor>`.
pub trait RemoteAccessor: Send + Sync {
    /// Non-recursive listing of `dir` (a prefix ending in `/`, or empty for
    /// the bucket root).
    fn list_entries(&self, dir: &str) -> MuxfysResult<Vec<RemoteEntry>>;

    /// Opens the object body for streaming read from offset 0.
    fn open_file(&self, path: &str) -> MuxfysResult<Box<dyn RemoteStream>>;

    /// Downloads the whole object to `dest` on local disk.
    fn download_file(&self, src: &str, dest: &Path) -> MuxfysResult<()>;

    /// Uploads `src` (a local path) to `dest` (an object key) with the given
    /// MIME content type.
    fn upload_file(&self, src: &Path, dest: &str, content_type: &str) -> MuxfysResult<()>;

    /// Server-side copy within the remote, if supported.
    fn copy_file(&self, src: &str, dest: &str) -> MuxfysResult<()>;

    /// Idempotent: succeeds even if `path` does not exist.
    fn delete_file(&self, path: &str) -> MuxfysResult<()>;

    /// Classifies an already-produced [`crate::error::MuxfysError`] as a
    /// "does not exist" condition (404-like), vs. some other failure.
    fn error_is_not_exists(&self, err: &crate::error::MuxfysError) -> bool;

    /// A human-readable identifier for this target, used in logging.
    fn target(&self) -> &str;

    /// Joins a mount-relative path onto this accessor's base path to produce
    /// the full remote key.
    fn remote_path(&self, rel: &str) -> String;

    /// Composes the local cache path for `remote_path` under `base_dir`.
    fn local_path(&self, base_dir: &Path, remote_path: &str) -> PathBuf {
        base_dir.join(remote_path)
    }
}
