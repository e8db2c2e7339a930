//! A filesystem-backed [`RemoteAccessor`] standing in for a bucket during
//! tests. Mirrors the shape of the S3 accessor exactly so unit and scenario
//! tests can swap one for the other without touching calling code.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use super::{RemoteAccessor, RemoteEntry, RemoteStream};
use crate::error::{MuxfysError, MuxfysResult};

pub struct LocalAccessor {
    root: PathBuf,
    base_path: String,
    name: String,
}

impl LocalAccessor {
    /// `root` stands in for the bucket; `base_path` is the sub-path within
    /// it this accessor is scoped to (may be empty).
    pub fn new(root: impl Into<PathBuf>, base_path: impl Into<String>) -> Self {
        let root = root.into();
        let name = format!("local://{}", root.display());
        LocalAccessor {
            root,
            base_path: base_path.into().trim_matches('/').to_string(),
            name,
        }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

impl RemoteAccessor for LocalAccessor {
    fn list_entries(&self, dir: &str) -> MuxfysResult<Vec<RemoteEntry>> {
        let full = self.full_path(dir);
        let read_dir = match fs::read_dir(&full) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            if metadata.is_dir() {
                entries.push(RemoteEntry {
                    name: format!("{file_name}/"),
                    size: 0,
                    mtime,
                });
            } else {
                entries.push(RemoteEntry {
                    name: file_name,
                    size: metadata.len() as i64,
                    mtime,
                });
            }
        }
        Ok(entries)
    }

    fn open_file(&self, path: &str) -> MuxfysResult<Box<dyn RemoteStream>> {
        let full = self.full_path(path);
        let data = fs::read(&full)?;
        Ok(Box::new(CursorStream {
            data,
            pos: 0,
        }))
    }

    fn download_file(&self, src: &str, dest: &Path) -> MuxfysResult<()> {
        let full = self.full_path(src);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&full, dest)?;
        Ok(())
    }

    fn upload_file(&self, src: &Path, dest: &str, _content_type: &str) -> MuxfysResult<()> {
        let full = self.full_path(dest);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &full)?;
        Ok(())
    }

    fn copy_file(&self, src: &str, dest: &str) -> MuxfysResult<()> {
        let src_full = self.full_path(src);
        let dest_full = self.full_path(dest);
        if let Some(parent) = dest_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src_full, &dest_full)?;
        Ok(())
    }

    fn delete_file(&self, path: &str) -> MuxfysResult<()> {
        let full = self.full_path(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn error_is_not_exists(&self, err: &MuxfysError) -> bool {
        matches!(err, MuxfysError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    fn target(&self) -> &str {
        &self.name
    }

    fn remote_path(&self, rel: &str) -> String {
        if self.base_path.is_empty() {
            rel.to_string()
        } else if rel.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}/{}", self.base_path, rel)
        }
    }
}

struct CursorStream {
    data: Vec<u8>,
    pos: usize,
}

impl Read for CursorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let n = cursor.read(buf)?;
        self.pos += n;
        Ok(n)
    }
}

impl RemoteStream for CursorStream {
    fn seek_to(&mut self, offset: i64) -> MuxfysResult<()> {
        self.pos = (offset.max(0) as usize).min(self.data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn list_entries_reports_trailing_slash_for_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let accessor = LocalAccessor::new(dir.path(), "");

        let mut names: Vec<_> = accessor
            .list_entries("")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "sub/".to_string()]);
    }

    #[test]
    fn list_entries_on_missing_dir_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let accessor = LocalAccessor::new(dir.path(), "");
        assert!(accessor.list_entries("nope").unwrap().is_empty());
    }

    #[test]
    fn open_file_supports_seek_then_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        let accessor = LocalAccessor::new(dir.path(), "");

        let mut stream = accessor.open_file("a.txt").unwrap();
        stream.seek_to(5).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"56789");
    }

    #[test]
    fn delete_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let accessor = LocalAccessor::new(dir.path(), "");
        accessor.delete_file("missing.txt").unwrap();

        let mut f = fs::File::create(dir.path().join("x.txt")).unwrap();
        f.write_all(b"x").unwrap();
        drop(f);
        accessor.delete_file("x.txt").unwrap();
        accessor.delete_file("x.txt").unwrap();
    }
}
