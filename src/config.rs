//! `Config`/`Target` types, URL parsing, and the `ReadEnvironment`
//! credential-discovery algorithm merging `~/.s3cfg`, the AWS shared
//! credentials/config files, `~/.awssecret`, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MuxfysError, MuxfysResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub mount: PathBuf,
    #[serde(default)]
    pub retries: u32,
    pub cache_base: PathBuf,
    #[serde(default)]
    pub verbose: bool,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Target {
    pub target: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub cache_data: Option<bool>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub write: Option<bool>,
}

/// A `Target` after URL parsing, derivation (`write ⇒ cache_data`,
/// `cache_dir set ⇒ cache_data`), and credential resolution.
pub struct ResolvedTarget {
    pub scheme: String,
    pub host: String,
    pub bucket: String,
    pub base_path: String,
    pub cache_data: bool,
    pub cache_dir: Option<PathBuf>,
    pub writeable: bool,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub host_base: Option<String>,
    pub use_https: bool,
}

pub fn parse_url(raw: &str) -> MuxfysResult<(String, String, String, String)> {
    let url = Url::parse(raw).map_err(|e| MuxfysError::config(format!("invalid target URL {raw}: {e}")))?;
    let scheme = url.scheme().to_string();
    if scheme.is_empty() {
        return Err(MuxfysError::config(format!("target URL {raw} has no scheme")));
    }
    let host = url
        .host_str()
        .ok_or_else(|| MuxfysError::config(format!("target URL {raw} has no host")))?
        .to_string();
    let mut segments = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default();
    if segments.is_empty() {
        return Err(MuxfysError::config(format!("target URL {raw} has no bucket")));
    }
    let bucket = segments.remove(0).to_string();
    let base_path = segments.join("/");
    Ok((scheme, host, bucket, base_path))
}

impl Target {
    pub fn resolve(&self, profile: &str) -> MuxfysResult<ResolvedTarget> {
        let (scheme, host, bucket, base_path) = parse_url(&self.target)?;

        let mut creds = read_environment(profile, None)?;
        if self.access_key.is_some() {
            creds.access_key = self.access_key.clone();
        }
        if self.secret_key.is_some() {
            creds.secret_key = self.secret_key.clone();
        }
        if self.region.is_some() {
            creds.region = self.region.clone();
        }

        let cache_data = self.cache_data.unwrap_or(false) || self.cache_dir.is_some() || self.write.unwrap_or(false);
        let writeable = self.write.unwrap_or(false);

        Ok(ResolvedTarget {
            scheme,
            host,
            bucket,
            base_path,
            cache_data,
            cache_dir: self.cache_dir.clone(),
            writeable,
            credentials: creds,
        })
    }
}

/// Resolves the profile name: explicit argument, then `AWS_DEFAULT_PROFILE`,
/// then `AWS_PROFILE`, then `"default"`.
pub fn resolve_profile(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| env::var("AWS_DEFAULT_PROFILE").ok())
        .or_else(|| env::var("AWS_PROFILE").ok())
        .unwrap_or_else(|| "default".to_string())
}

/// Merges credential sources in ascending priority, then applies environment
/// variable overrides. An empty result (no credentials found anywhere) is not
/// an error — it represents anonymous public-bucket access.
pub fn read_environment(profile: &str, home_override: Option<&Path>) -> MuxfysResult<Credentials> {
    let mut creds = Credentials {
        use_https: true,
        host_base: Some("s3.amazonaws.com".to_string()),
        ..Credentials::default()
    };

    let home = home_override.map(Path::to_path_buf).or_else(dirs::home_dir);
    let Some(home) = home else {
        return apply_env_overrides(creds);
    };

    if let Some(section) = load_ini_section(&home.join(".s3cfg"), "default") {
        merge_ini(&mut creds, &section);
    }

    let shared_creds_path = env::var("AWS_SHARED_CREDENTIALS_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".aws/credentials"));
    let creds_section = if profile == "default" { "default" } else { profile };
    if let Some(section) = load_ini_section(&shared_creds_path, creds_section) {
        merge_ini(&mut creds, &section);
    }

    let config_path = env::var("AWS_CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".aws/config"));
    let config_section = if profile == "default" {
        "default".to_string()
    } else {
        format!("profile {profile}")
    };
    if let Some(section) = load_ini_section(&config_path, &config_section) {
        merge_ini(&mut creds, &section);
    }

    if creds.access_key.is_none() {
        if let Ok(contents) = fs::read_to_string(home.join(".awssecret")) {
            if let Some((access, secret)) = contents.trim().split_once(':') {
                creds.access_key = Some(access.to_string());
                creds.secret_key = Some(secret.to_string());
            }
        }
    }

    apply_env_overrides(creds)
}

fn apply_env_overrides(mut creds: Credentials) -> MuxfysResult<Credentials> {
    if let Ok(key) = env::var("AWS_ACCESS_KEY_ID") {
        creds.access_key = Some(key);
    }
    if let Ok(secret) = env::var("AWS_SECRET_ACCESS_KEY") {
        creds.secret_key = Some(secret);
    }
    if let Ok(region) = env::var("AWS_DEFAULT_REGION") {
        creds.region = Some(region);
    }
    Ok(creds)
}

fn load_ini_section(path: &Path, section: &str) -> Option<ini::Properties> {
    let conf = ini::Ini::load_from_file(path).ok()?;
    conf.section(Some(section)).cloned()
}

fn merge_ini(creds: &mut Credentials, section: &ini::Properties) {
    if let Some(v) = section.get("use_https") {
        creds.use_https = v.eq_ignore_ascii_case("true") || v == "1";
    }
    if let Some(v) = section.get("host_base") {
        creds.host_base = Some(v.to_string());
    }
    if let Some(v) = section.get("region") {
        creds.region = Some(v.to_string());
    }
    if let Some(v) = section.get("access_key").or_else(|| section.get("aws_access_key_id")) {
        creds.access_key = Some(v.to_string());
    }
    if let Some(v) = section.get("secret_key").or_else(|| section.get("aws_secret_access_key")) {
        creds.secret_key = Some(v.to_string());
    }
}

/// Validates and, if necessary, creates the mount point. Refuses a non-empty
/// directory, a regular file, or (for non-root users) a path under `/`.
pub fn validate_mount_point(raw: &Path) -> MuxfysResult<PathBuf> {
    let expanded = expand_tilde(raw)?;

    if expanded == Path::new("/") && !running_as_root() {
        return Err(MuxfysError::config("refusing to mount at / as a non-root user"));
    }

    if expanded.is_file() {
        return Err(MuxfysError::config(format!(
            "mount point {} is a regular file",
            expanded.display()
        )));
    }

    if !expanded.exists() {
        fs::create_dir_all(&expanded)?;
        return Ok(expanded);
    }

    let mut entries = fs::read_dir(&expanded)?;
    if entries.next().is_some() {
        return Err(MuxfysError::config(format!(
            "mount point {} was not empty",
            expanded.display()
        )));
    }
    Ok(expanded)
}

fn expand_tilde(path: &Path) -> MuxfysResult<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix('~') {
        let home = dirs::home_dir()
            .ok_or_else(|| MuxfysError::config("cannot expand ~: no home directory"))?;
        Ok(home.join(rest.trim_start_matches('/')))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_splits_bucket_and_base_path() {
        let (scheme, host, bucket, base) = parse_url("https://s3.example.com/my-bucket/sub/dir").unwrap();
        assert_eq!(scheme, "https");
        assert_eq!(host, "s3.example.com");
        assert_eq!(bucket, "my-bucket");
        assert_eq!(base, "sub/dir");
    }

    #[test]
    fn parse_url_without_bucket_is_config_error() {
        assert!(parse_url("https://s3.example.com/").is_err());
    }

    #[test]
    fn resolve_profile_prefers_explicit_argument() {
        assert_eq!(resolve_profile(Some("work")), "work");
    }

    #[test]
    fn target_derives_cache_data_from_write_and_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let t = Target {
            target: "https://s3.example.com/bucket".to_string(),
            region: None,
            access_key: None,
            secret_key: None,
            cache_data: None,
            cache_dir: Some(dir.path().to_path_buf()),
            write: None,
        };
        let resolved = t.resolve("default").unwrap();
        assert!(resolved.cache_data);
        assert!(!resolved.writeable);
    }

    #[test]
    fn read_environment_with_no_home_is_anonymous_not_error() {
        let creds = read_environment("default", Some(Path::new("/nonexistent-home-for-tests"))).unwrap();
        assert!(creds.access_key.is_none());
    }

    #[test]
    fn validate_mount_point_rejects_nonempty_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stray.txt"), b"x").unwrap();
        assert!(validate_mount_point(dir.path()).is_err());
    }

    #[test]
    fn validate_mount_point_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        let resolved = validate_mount_point(&target).unwrap();
        assert!(resolved.is_dir());
    }
}
