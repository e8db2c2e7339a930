//! Per-open-file state for a file whose binding has `cache_data = true`:
//! reads and writes go through a local sparse file, with the cache tracker
//! recording which byte ranges are actually populated on disk.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::binding::RemoteBinding;
use crate::error::MuxfysResult;
use crate::file_lock::FileLockRegistry;
use crate::interval::Interval;
use crate::namespace::{Attr, Namespace};

pub struct CachedFile {
    binding: Arc<RemoteBinding>,
    rel_path: String,
    local_path: PathBuf,
    file: File,
}

impl CachedFile {
    /// Implements the open-with-caching algorithm: ensures the local sparse
    /// file exists at the right size, doing a full download up front when the
    /// cache is shared (non-ephemeral) or the file is being opened append-only.
    pub fn open(
        binding: Arc<RemoteBinding>,
        locks: &FileLockRegistry,
        rel_path: &str,
        attr: Attr,
        flags: i32,
    ) -> MuxfysResult<Self> {
        let local_path = binding.local_path(rel_path);
        let _guard = locks.acquire(&local_path)?;

        let exists = local_path.exists();
        let size_matches = exists
            && local_path
                .metadata()
                .map(|m| m.len() == attr.size)
                .unwrap_or(false);

        let needs_create = !exists || !size_matches;
        if exists && !size_matches {
            tracing::warn!(path = rel_path, "cached file size mismatch, refetching");
            let _ = std::fs::remove_file(&local_path);
        }

        if needs_create {
            if let Some(parent) = local_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let append = flags & libc::O_APPEND != 0;
            if !binding.cache_is_ephemeral || append {
                binding.download_file(rel_path, &local_path)?;
            } else {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&local_path)?;
                file.set_len(attr.size)?;
            }
        } else if binding.cache_is_ephemeral && flags & libc::O_APPEND != 0 {
            // Already sparse at the right size from an earlier partial open;
            // appending needs the whole file present, so fill every gap the
            // tracker still reports before handing back the handle.
            let whole = Interval::new(0, attr.size as i64);
            for gap in binding.tracker().uncached(&local_path, whole) {
                binding.download_range(rel_path, &local_path, gap)?;
            }
        }

        let file = OpenOptions::new().read(true).write(true).open(&local_path)?;
        Ok(CachedFile {
            binding,
            rel_path: rel_path.to_string(),
            local_path,
            file,
        })
    }

    pub fn read(&self, locks: &FileLockRegistry, off: i64, size: u32, attr: Attr) -> MuxfysResult<Vec<u8>> {
        let start = off.max(0).min(attr.size as i64);
        let end = (off + size as i64).max(start).min(attr.size as i64);
        let probe = Interval::new(start, end);
        if probe.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = locks.acquire(&self.local_path)?;
        for gap in self.binding.tracker().uncached(&self.local_path, probe) {
            self.binding.download_range(&self.rel_path, &self.local_path, gap)?;
        }

        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(start as u64))?;
        let mut buf = vec![0u8; (end - start) as usize];
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(buf)
    }

    pub fn write(
        &self,
        locks: &FileLockRegistry,
        ns: &Namespace,
        off: i64,
        data: &[u8],
    ) -> MuxfysResult<usize> {
        let _guard = locks.acquire(&self.local_path)?;

        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(off as u64))?;
        file.write_all(data)?;

        let new_size = (off + data.len() as i64) as u64;
        self.binding.tracker().cache_override(
            &self.local_path,
            Interval::new(off, off + data.len() as i64),
        );
        ns.update_attr(&self.rel_path, |attr| {
            attr.size = attr.size.max(new_size);
            attr.mtime = crate::namespace::now_secs();
        });
        ns.mark_created(&self.rel_path);
        Ok(data.len())
    }

    pub fn truncate(&self, locks: &FileLockRegistry, ns: &Namespace, off: i64) -> MuxfysResult<()> {
        let _guard = locks.acquire(&self.local_path)?;
        self.file.set_len(off.max(0) as u64)?;
        self.binding.tracker().cache_truncate(&self.local_path, off);
        ns.update_attr(&self.rel_path, |attr| {
            attr.size = off.max(0) as u64;
            attr.mtime = crate::namespace::now_secs();
        });
        ns.mark_created(&self.rel_path);
        Ok(())
    }

    pub fn flush(&self) -> MuxfysResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn release(self) -> MuxfysResult<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::local::LocalAccessor;

    fn binding(root: &std::path::Path) -> Arc<RemoteBinding> {
        Arc::new(RemoteBinding::new(
            Box::new(LocalAccessor::new(root, "")),
            true,
            Some(root.join(".cache")),
            true,
            true,
            1,
            "/mnt".to_string(),
        ))
    }

    #[test]
    fn open_on_ephemeral_cache_defers_download_until_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"0123456789").unwrap();
        let b = binding(dir.path());
        let locks = FileLockRegistry::new();
        let attr = Attr::now_regular(10);

        let cf = CachedFile::open(b.clone(), &locks, "obj.bin", attr, 0).unwrap();
        assert!(b.tracker().uncached(&cf.local_path, Interval::new(0, 10)).len() == 1);

        let bytes = cf.read(&locks, 2, 3, attr).unwrap();
        assert_eq!(bytes, b"234");
    }

    #[test]
    fn write_extends_size_and_marks_created() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"").unwrap();
        let b = binding(dir.path());
        let locks = FileLockRegistry::new();
        let ns = Namespace::new();
        ns.create_file("obj.bin", b.clone());
        let attr = ns.file_attr("obj.bin").unwrap();

        let cf = CachedFile::open(b, &locks, "obj.bin", attr, libc::O_WRONLY).unwrap();
        cf.write(&locks, &ns, 0, b"hello").unwrap();
        assert_eq!(ns.file_attr("obj.bin").unwrap().size, 5);
    }
}
