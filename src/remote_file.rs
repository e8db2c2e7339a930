//! A handle for bindings with `cache_data = false`: no local sparse file, no
//! cache tracker. Reads are served from one accessor-provided stream kept
//! positioned as close to the caller's offset as possible; writes must be
//! strictly sequential.

use std::sync::Arc;

use crate::accessor::RemoteStream;
use crate::binding::RemoteBinding;
use crate::error::{MuxfysError, MuxfysResult};

/// A read ahead of the current position by less than this many bytes is
/// served by reading-and-discarding the gap rather than reopening the stream.
const SKIP_WINDOW: i64 = 64 * 1024;

pub struct RemoteFile {
    binding: Arc<RemoteBinding>,
    rel_path: String,
    stream: Box<dyn RemoteStream>,
    pos: i64,
}

impl RemoteFile {
    pub fn open(binding: Arc<RemoteBinding>, rel_path: &str) -> MuxfysResult<Self> {
        let key = binding.remote_key(rel_path);
        let stream = binding.accessor.open_file(&key)?;
        Ok(RemoteFile {
            binding,
            rel_path: rel_path.to_string(),
            stream,
            pos: 0,
        })
    }

    pub fn read(&mut self, off: i64, size: u32) -> MuxfysResult<Vec<u8>> {
        if off < self.pos || off - self.pos > SKIP_WINDOW {
            self.stream.seek_to(off)?;
            self.pos = off;
        } else if off > self.pos {
            let mut discard = vec![0u8; (off - self.pos) as usize];
            std::io::Read::read_exact(&mut self.stream, &mut discard)?;
            self.pos = off;
        }

        let mut buf = vec![0u8; size as usize];
        let mut total = 0;
        while total < buf.len() {
            let n = std::io::Read::read(&mut self.stream, &mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        self.pos += total as i64;
        Ok(buf)
    }

    /// The exact semantics of non-sequential writes to an uncached file are
    /// unspecified upstream; this port refuses uncached writes entirely
    /// rather than guess (open already enforces this before a handle like
    /// this one is ever created with write intent).
    pub fn write(&mut self, _off: i64, _data: &[u8]) -> MuxfysResult<()> {
        Err(MuxfysError::not_supported(format!(
            "uncached writes are not supported ({})",
            self.rel_path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::local::LocalAccessor;

    fn binding(root: &std::path::Path) -> Arc<RemoteBinding> {
        Arc::new(RemoteBinding::new(
            Box::new(LocalAccessor::new(root, "")),
            false,
            None,
            false,
            false,
            1,
            "/mnt".to_string(),
        ))
    }

    #[test]
    fn sequential_reads_advance_without_reopen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"0123456789").unwrap();
        let b = binding(dir.path());
        let mut rf = RemoteFile::open(b, "obj.bin").unwrap();

        assert_eq!(rf.read(0, 3).unwrap(), b"012");
        assert_eq!(rf.read(3, 3).unwrap(), b"345");
    }

    #[test]
    fn small_forward_skip_reads_within_window() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"0123456789").unwrap();
        let b = binding(dir.path());
        let mut rf = RemoteFile::open(b, "obj.bin").unwrap();

        assert_eq!(rf.read(5, 5).unwrap(), b"56789");
    }

    #[test]
    fn backward_read_reseeks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"0123456789").unwrap();
        let b = binding(dir.path());
        let mut rf = RemoteFile::open(b, "obj.bin").unwrap();

        rf.read(8, 2).unwrap();
        assert_eq!(rf.read(0, 3).unwrap(), b"012");
    }

    #[test]
    fn uncached_write_is_always_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obj.bin"), b"").unwrap();
        let b = binding(dir.path());
        let mut rf = RemoteFile::open(b, "obj.bin").unwrap();
        assert!(rf.write(0, b"x").is_err());
    }
}
