//! Per-cache-path mutual exclusion spanning both this process and any other
//! process sharing the same cache directory.
//!
//! A path's lock file lives beside it as `.muxfys_lock.<name>`, held with an
//! OS advisory lock via `fslock` for the cross-process half, combined with an
//! in-process `Mutex` keyed by path so the (non-reentrant on some platforms)
//! OS lock is never acquired twice from the same process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use fslock::LockFile;

use crate::error::MuxfysResult;

/// Tracks which paths are currently locked in-process, guarding re-entrant
/// acquisition from the same process without relying on the OS lock (which
/// on some platforms is not re-entrant within a single process).
#[derive(Default)]
struct InProcess {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

#[derive(Default)]
pub struct FileLockRegistry {
    in_process: Arc<InProcess>,
}

impl FileLockRegistry {
    pub fn new() -> Self {
        FileLockRegistry {
            in_process: Arc::new(InProcess::default()),
        }
    }

    /// Acquires the named lock for `local_path`. Blocks until available.
    pub fn acquire(&self, local_path: &Path) -> MuxfysResult<FileLockGuard> {
        let key = local_path.to_path_buf();
        {
            let mut held = self.in_process.held.lock().unwrap();
            while held.contains(&key) {
                held = self.in_process.released.wait(held).unwrap();
            }
            held.insert(key.clone());
        }

        let lock_path = sibling_lock_path(local_path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut os_lock = LockFile::open(&lock_path)?;
        os_lock.lock()?;

        Ok(FileLockGuard {
            os_lock,
            key,
            in_process: self.in_process.clone(),
        })
    }
}

fn sibling_lock_path(local_path: &Path) -> PathBuf {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    local_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".muxfys_lock.{name}"))
}

pub struct FileLockGuard {
    os_lock: LockFile,
    key: PathBuf,
    in_process: Arc<InProcess>,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = self.os_lock.unlock();
        self.in_process.held.lock().unwrap().remove(&self.key);
        self.in_process.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_lock_path_is_dotted_and_adjacent() {
        let p = sibling_lock_path(Path::new("/cache/dir/name.txt"));
        assert_eq!(p, PathBuf::from("/cache/dir/.muxfys_lock.name.txt"));
    }

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f.txt");
        std::fs::write(&target, b"x").unwrap();
        let registry = FileLockRegistry::new();

        {
            let _guard = registry.acquire(&target).unwrap();
        }
        let _guard2 = registry.acquire(&target).unwrap();
    }
}
