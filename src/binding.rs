//! A configured remote target: an accessor plus the retry policy, cache
//! directory, and per-path byte-range bookkeeping that turn raw accessor
//! calls into the operations the namespace façade needs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{error, info};

use crate::accessor::RemoteAccessor;
use crate::cache_tracker::CacheTracker;
use crate::error::{MuxfysError, MuxfysResult};
use crate::interval::Interval;

const RETRY_MIN: Duration = Duration::from_millis(100);
const RETRY_MAX: Duration = Duration::from_secs(10);
const RETRY_FACTOR: u32 = 3;

pub struct RemoteBinding {
    pub accessor: Box<dyn RemoteAccessor>,
    pub cache_data: bool,
    pub cache_dir: Option<PathBuf>,
    pub cache_is_ephemeral: bool,
    pub writeable: bool,
    pub max_attempts: u32,
    pub mount_point: String,
    tracker: CacheTracker,
}

impl RemoteBinding {
    pub fn new(
        accessor: Box<dyn RemoteAccessor>,
        cache_data: bool,
        cache_dir: Option<PathBuf>,
        cache_is_ephemeral: bool,
        writeable: bool,
        max_attempts: u32,
        mount_point: String,
    ) -> Self {
        RemoteBinding {
            accessor,
            cache_data,
            cache_dir,
            cache_is_ephemeral,
            writeable,
            max_attempts: max_attempts.max(1),
            mount_point,
            tracker: CacheTracker::new(),
        }
    }

    pub fn tracker(&self) -> &CacheTracker {
        &self.tracker
    }

    pub fn remote_key(&self, rel: &str) -> String {
        self.accessor.remote_path(rel)
    }

    /// Local on-disk path for `rel`, only meaningful when `cache_data` is set.
    pub fn local_path(&self, rel: &str) -> PathBuf {
        let base = self
            .cache_dir
            .as_deref()
            .expect("local_path called on a binding without a cache directory");
        self.accessor.local_path(base, &self.remote_key(rel))
    }

    fn with_retry<T>(
        &self,
        call: &'static str,
        rel: &str,
        mut f: impl FnMut() -> MuxfysResult<T>,
    ) -> MuxfysResult<T> {
        let mut attempt = 0;
        let mut delay = RETRY_MIN;
        let mut last_err: Option<MuxfysError> = None;
        let start = Instant::now();

        loop {
            attempt += 1;
            match f() {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            pkg = "muxfys",
                            mount = %self.mount_point,
                            target = self.accessor.target(),
                            call,
                            path = rel,
                            retries = attempt - 1,
                            walltime = ?start.elapsed(),
                            previous_err = %last_err.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                            "remote call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if self.accessor.error_is_not_exists(&err) {
                        return Err(err);
                    }
                    if attempt >= self.max_attempts {
                        error!(
                            pkg = "muxfys",
                            mount = %self.mount_point,
                            target = self.accessor.target(),
                            call,
                            path = rel,
                            retries = attempt - 1,
                            walltime = ?start.elapsed(),
                            err = %err,
                            "remote call failed after exhausting retries"
                        );
                        return Err(err);
                    }
                    last_err = Some(err);
                    let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
                    std::thread::sleep(Duration::from_millis(jitter));
                    delay = (delay * RETRY_FACTOR).min(RETRY_MAX);
                }
            }
        }
    }

    /// Lists `prefix`; a not-exists listing is treated as an empty, successful
    /// result (root/empty directories are legal).
    pub fn find_objects(&self, prefix: &str) -> MuxfysResult<Vec<crate::accessor::RemoteEntry>> {
        match self.with_retry("ListEntries", prefix, || {
            self.accessor.list_entries(&self.remote_key(prefix))
        }) {
            Ok(entries) => Ok(entries),
            Err(err) if self.accessor.error_is_not_exists(&err) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub fn download_range(&self, rel: &str, local: &Path, iv: Interval) -> MuxfysResult<()> {
        self.with_retry("DownloadRange", rel, || {
            let mut stream = self.accessor.open_file(&self.remote_key(rel))?;
            stream.seek_to(iv.start)?;

            let file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(local)?;
            file.set_len(file.metadata()?.len().max(iv.end as u64))?;
            positioned_copy(&mut stream, &file, iv.start, iv.len() as u64)?;
            Ok(())
        })?;
        self.tracker.cached(local, iv);
        Ok(())
    }

    pub fn download_file(&self, rel: &str, local: &Path) -> MuxfysResult<u64> {
        let size = self.with_retry("DownloadFile", rel, || {
            self.accessor.download_file(&self.remote_key(rel), local)?;
            Ok(local.metadata()?.len())
        })?;
        self.tracker.cache_override(local, Interval::new(0, size as i64));
        Ok(size)
    }

    pub fn upload_file(&self, local: &Path, rel: &str) -> MuxfysResult<()> {
        self.with_retry("UploadFile", rel, || {
            self.accessor
                .upload_file(local, &self.remote_key(rel), "application/octet-stream")
        })
    }

    pub fn copy_file(&self, old_rel: &str, new_rel: &str) -> MuxfysResult<()> {
        self.with_retry("CopyFile", new_rel, || {
            self.accessor
                .copy_file(&self.remote_key(old_rel), &self.remote_key(new_rel))
        })
    }

    pub fn delete_file(&self, rel: &str) -> MuxfysResult<()> {
        match self.with_retry("DeleteFile", rel, || {
            self.accessor.delete_file(&self.remote_key(rel))
        }) {
            Ok(()) => Ok(()),
            Err(err) if self.accessor.error_is_not_exists(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Recursively removes this binding's cache directory if it was
    /// auto-created for this mount.
    pub fn cleanup_ephemeral_cache(&self) {
        if self.cache_is_ephemeral {
            if let Some(dir) = &self.cache_dir {
                let _ = fs::remove_dir_all(dir);
            }
        }
    }
}

fn positioned_copy(
    src: &mut dyn std::io::Read,
    dest: &fs::File,
    offset: i64,
    len: u64,
) -> MuxfysResult<()> {
    use std::io::{Seek, SeekFrom, Write};

    let mut dest = dest.try_clone()?;
    dest.seek(SeekFrom::Start(offset as u64))?;
    let mut remaining = len;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::local::LocalAccessor;

    fn binding(root: &Path, writeable: bool) -> RemoteBinding {
        RemoteBinding::new(
            Box::new(LocalAccessor::new(root, "")),
            true,
            Some(root.join(".cache")),
            true,
            writeable,
            3,
            "/mnt/test".to_string(),
        )
    }

    #[test]
    fn find_objects_on_missing_prefix_is_empty_ok() {
        let dir = tempfile::tempdir().unwrap();
        let b = binding(dir.path(), false);
        assert!(b.find_objects("nope").unwrap().is_empty());
    }

    #[test]
    fn download_range_populates_exact_interval_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("obj.bin"), b"0123456789").unwrap();
        let b = binding(dir.path(), false);
        let local = dir.path().join("local.bin");

        b.download_range("obj.bin", &local, Interval::new(2, 5)).unwrap();
        let data = fs::read(&local).unwrap();
        assert_eq!(&data[2..5], b"234");
        assert_eq!(b.tracker().uncached(&local, Interval::new(2, 5)), Vec::new());
    }

    #[test]
    fn download_file_overrides_tracker_with_whole_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("obj.bin"), b"hello world").unwrap();
        let b = binding(dir.path(), false);
        let local = dir.path().join("local.bin");

        let size = b.download_file("obj.bin", &local).unwrap();
        assert_eq!(size, 11);
        assert!(b.tracker().uncached(&local, Interval::new(0, 11)).is_empty());
    }

    #[test]
    fn delete_file_treats_not_found_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let b = binding(dir.path(), true);
        b.delete_file("missing.bin").unwrap();
    }
}
