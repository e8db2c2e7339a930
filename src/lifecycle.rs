//! Mount, unmount, and deferred-upload lifecycle for a built [`crate::Handle`].
//!
//! Mirrors the teacher's mount-then-block main loop, generalized into a
//! library entry point: `mount` spawns a background FUSE session, unmount
//! walks `created_files` oldest-first to flush writes before tearing the
//! session and caches down, and `unmount_on_death` wires that into a signal
//! handler so a killed process still uploads what it can.

use std::process;
use std::sync::{Arc, Mutex};

use fuser::{BackgroundSession, MountOption};

use crate::binding::RemoteBinding;
use crate::error::{MuxfysError, MuxfysResult};
use crate::fs::{FsHandle, MuxFs};

pub struct Handle {
    fs: Arc<Mutex<MuxFs>>,
    bindings: Vec<Arc<RemoteBinding>>,
    mount_point: String,
    /// Tracked separately from `session` so "already mounted" can be
    /// asserted without needing a real `BackgroundSession` in hand.
    mounted: Mutex<bool>,
    session: Mutex<Option<BackgroundSession>>,
}

impl Handle {
    pub(crate) fn new(fs: Arc<Mutex<MuxFs>>, bindings: Vec<Arc<RemoteBinding>>, mount_point: String) -> Self {
        Handle {
            fs,
            bindings,
            mount_point,
            mounted: Mutex::new(false),
            session: Mutex::new(None),
        }
    }

    /// Spawns the FUSE session in the background. A handle may only be
    /// mounted once at a time.
    pub fn mount(&self) -> MuxfysResult<()> {
        let mut mounted = self.mounted.lock().unwrap();
        if *mounted {
            return Err(MuxfysError::config("Can't mount more that once at a time"));
        }
        let options = vec![
            MountOption::FSName("muxfys".to_string()),
            MountOption::AutoUnmount,
        ];
        let handle = FsHandle(self.fs.clone());
        let bg = fuser::spawn_mount2(handle, &self.mount_point, &options)
            .map_err(|e| MuxfysError::remote(format!("mount failed: {e}")))?;
        *self.session.lock().unwrap() = Some(bg);
        *mounted = true;
        tracing::info!(pkg = "muxfys", mount = %self.mount_point, "mounted");
        Ok(())
    }

    /// Flushes deferred uploads, tears down the FUSE session, and cleans up
    /// ephemeral caches. `skip_uploads` is for the crash-path: a process that
    /// is dying mid-operation uploads best-effort or not at all, but never
    /// blocks the signal handler that called it.
    pub fn unmount(&self, skip_uploads: bool) -> MuxfysResult<()> {
        let mut mounted = self.mounted.lock().unwrap();
        if !*mounted {
            return Ok(());
        }

        let mut failed = 0usize;
        if !skip_uploads {
            failed = self.flush_created_files();
        }

        drop(self.session.lock().unwrap().take());
        *mounted = false;
        for binding in &self.bindings {
            binding.cleanup_ephemeral_cache();
        }

        tracing::info!(pkg = "muxfys", mount = %self.mount_point, "unmounted");
        if failed > 0 {
            return Err(MuxfysError::UploadFailed(failed));
        }
        Ok(())
    }

    /// Uploads every file recorded as created this mount, oldest `mtime`
    /// first, so a crash partway through favors earlier writes landing.
    fn flush_created_files(&self) -> usize {
        let namespace = self.fs.lock().unwrap().namespace.clone();
        let mut created = namespace.created_files();
        created.sort_by_key(|(_, attr)| attr.mtime);

        let mut failed = 0;
        for (path, _attr) in created {
            let Some(binding) = namespace.file_binding(&path) else {
                continue;
            };
            if !binding.cache_data {
                continue;
            }
            let local = binding.local_path(&path);
            match binding.upload_file(&local, &path) {
                Ok(()) => namespace.remove_created_file(&path),
                Err(err) => {
                    failed += 1;
                    tracing::error!(pkg = "muxfys", path = %path, err = %err, "deferred upload failed");
                }
            }
        }
        failed
    }

    /// Installs a `ctrlc` handler that unmounts on SIGINT/SIGTERM, attempting
    /// deferred uploads before exiting with status 1 (clean unmount) or 2
    /// (unmount itself failed).
    pub fn unmount_on_death(self: &Arc<Self>) -> MuxfysResult<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            tracing::warn!(pkg = "muxfys", mount = %handle.mount_point, "signal received, unmounting");
            match handle.unmount(false) {
                Ok(()) => process::exit(1),
                Err(_) => process::exit(2),
            }
        })
        .map_err(|e| MuxfysError::remote(format!("failed to install signal handler: {e}")))
    }

    pub fn logs(&self) -> Vec<String> {
        crate::logging::logs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::local::LocalAccessor;
    use crate::file_lock::FileLockRegistry;
    use crate::namespace::Namespace;

    fn test_handle(root: &std::path::Path) -> (Arc<Handle>, Arc<RemoteBinding>) {
        let binding = Arc::new(RemoteBinding::new(
            Box::new(LocalAccessor::new(root, "")),
            true,
            Some(root.join(".cache")),
            false,
            true,
            1,
            "/mnt".to_string(),
        ));
        let namespace = Arc::new(Namespace::new());
        namespace.seed_root(&[binding.clone()]);
        let fs = MuxFs::new(namespace, Arc::new(FileLockRegistry::new()), vec![binding.clone()], "/mnt".to_string());
        let handle = Arc::new(Handle::new(Arc::new(Mutex::new(fs)), vec![binding.clone()], "/mnt".to_string()));
        (handle, binding)
    }

    /// S2: a handle can't be mounted twice concurrently.
    #[test]
    fn mounting_an_already_mounted_handle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _binding) = test_handle(dir.path());
        *handle.mounted.lock().unwrap() = true;
        let err = handle.mount().unwrap_err().to_string();
        assert!(err.contains("more that once at a time"));
    }

    /// S3/S4: created files upload oldest-first and a failed upload is
    /// counted but does not stop the rest from being attempted.
    #[test]
    fn flush_created_files_counts_failures_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, binding) = test_handle(dir.path());
        let namespace = handle.fs.lock().unwrap().namespace.clone();

        namespace.create_file("ok.txt", binding.clone());
        let ok_local = binding.local_path("ok.txt");
        std::fs::create_dir_all(ok_local.parent().unwrap()).unwrap();
        std::fs::write(&ok_local, b"hello").unwrap();

        namespace.create_file("missing.txt", binding.clone());
        // No local file written for "missing.txt": its upload will fail
        // because there is nothing on disk to read from.

        let failed = handle.flush_created_files();
        assert_eq!(failed, 1);
        assert!(namespace.created_files().iter().all(|(p, _)| p == "missing.txt"));
    }
}
