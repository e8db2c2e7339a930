//! Mounts one or more S3-compatible buckets as a local FUSE filesystem.
//!
//! Multiple targets multiplex onto one mount point: directory trees are
//! unioned first-remote-wins, and at most one target may accept writes.
//! See [`New`] for the entry point.

pub mod accessor;
pub mod binding;
pub mod cache_tracker;
pub mod cached_file;
pub mod config;
pub mod error;
pub mod file_lock;
pub mod fs;
pub mod interval;
pub mod lifecycle;
pub mod logging;
pub mod namespace;
pub mod remote_file;

use std::sync::{Arc, Mutex};

use accessor::s3::S3Accessor;
use binding::RemoteBinding;
use config::Config;
use error::{MuxfysError, MuxfysResult};
use fs::MuxFs;
use namespace::Namespace;

pub use lifecycle::Handle;
pub use logging::{logs, set_log_handler};

/// Validates `config`, resolves every target's credentials, and builds a
/// [`Handle`] ready for [`Handle::mount`]. Construction-time failures (bad
/// URL, no bucket, more than one writeable target, zero targets, a
/// non-empty mount point) surface here rather than from the FUSE façade.
pub fn new(config: Config) -> MuxfysResult<Arc<Handle>> {
    logging::init(config.verbose);

    if config.targets.is_empty() {
        return Err(MuxfysError::config("no targets configured"));
    }

    let mount_point = config::validate_mount_point(&config.mount)?;
    let mount_str = mount_point.to_string_lossy().to_string();
    let profile = config::resolve_profile(None);
    // retries: u32, default 0 = 1 attempt; maxAttempts = retries + 1.
    let retries = config.retries.saturating_add(1);

    let mut bindings = Vec::with_capacity(config.targets.len());
    let mut writeable_count = 0;
    for target in &config.targets {
        let resolved = target.resolve(&profile)?;
        if resolved.writeable {
            writeable_count += 1;
        }

        let endpoint = format!(
            "{}://{}",
            if resolved.credentials.use_https { "https" } else { "http" },
            resolved.host
        );
        let accessor = S3Accessor::new(
            &endpoint,
            &resolved.bucket,
            &resolved.base_path,
            resolved.credentials.access_key.as_deref().unwrap_or(""),
            resolved.credentials.secret_key.as_deref().unwrap_or(""),
        )?;

        let cache_dir = if resolved.cache_data {
            Some(resolved.cache_dir.clone().unwrap_or_else(|| {
                config.cache_base.join(sanitize(&format!(
                    "{}-{}",
                    resolved.bucket, resolved.base_path
                )))
            }))
        } else {
            None
        };
        let cache_is_ephemeral = resolved.cache_data && resolved.cache_dir.is_none();
        if let Some(dir) = &cache_dir {
            std::fs::create_dir_all(dir)?;
        }

        bindings.push(Arc::new(RemoteBinding::new(
            Box::new(accessor),
            resolved.cache_data,
            cache_dir,
            cache_is_ephemeral,
            resolved.writeable,
            retries,
            mount_str.clone(),
        )));
    }

    if writeable_count > 1 {
        return Err(MuxfysError::config("you can't have more than one writeable target"));
    }

    let namespace = Arc::new(Namespace::new());
    namespace.seed_root(&bindings);

    let locks = Arc::new(file_lock::FileLockRegistry::new());
    let mux = MuxFs::new(namespace, locks, bindings.clone(), mount_str.clone());

    Ok(Arc::new(Handle::new(Arc::new(Mutex::new(mux)), bindings, mount_str)))
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Target;

    fn base_config(mount: &std::path::Path, cache: &std::path::Path) -> Config {
        Config {
            mount: mount.to_path_buf(),
            retries: 3,
            cache_base: cache.to_path_buf(),
            verbose: false,
            targets: vec![Target {
                target: "https://s3.example.com/bucket".to_string(),
                region: None,
                access_key: Some("k".to_string()),
                secret_key: Some("s".to_string()),
                cache_data: Some(true),
                cache_dir: None,
                write: Some(false),
            }],
        }
    }

    #[test]
    fn rejects_zero_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(&dir.path().join("mnt"), &dir.path().join("cache"));
        cfg.targets.clear();
        assert!(new(cfg).is_err());
    }

    #[test]
    fn rejects_two_writeable_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(&dir.path().join("mnt"), &dir.path().join("cache"));
        let mut second = cfg.targets[0].clone();
        second.write = Some(true);
        cfg.targets[0].write = Some(true);
        cfg.targets.push(second);
        let err = new(cfg).err().unwrap().to_string();
        assert!(err.contains("more than one writeable target"));
    }

    #[test]
    fn rejects_nonempty_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("mnt");
        std::fs::create_dir_all(&mount).unwrap();
        std::fs::write(mount.join("stray"), b"x").unwrap();
        let cfg = base_config(&mount, &dir.path().join("cache"));
        let err = new(cfg).err().unwrap().to_string();
        assert!(err.contains("was not empty"));
    }

    #[test]
    fn accepts_single_writeable_target() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = base_config(&dir.path().join("mnt"), &dir.path().join("cache"));
        assert!(new(cfg).is_ok());
    }
}
