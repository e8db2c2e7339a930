//! Production [`RemoteAccessor`] speaking the S3 REST API directly: signed
//! requests via `rusty-s3`, transport via `reqwest`. No vendored AWS SDK.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};

use super::{RemoteAccessor, RemoteEntry, RemoteStream};
use crate::error::{MuxfysError, MuxfysResult};

const SIGNED_REQUEST_LIFETIME: Duration = Duration::from_secs(60);

pub struct S3Accessor {
    bucket: Bucket,
    credentials: Credentials,
    base_path: String,
    client: reqwest::blocking::Client,
    target: String,
}

impl S3Accessor {
    pub fn new(
        endpoint: &str,
        bucket_name: &str,
        base_path: &str,
        access_key: &str,
        secret_key: &str,
    ) -> MuxfysResult<Self> {
        let endpoint_url = endpoint
            .parse()
            .map_err(|e| MuxfysError::config(format!("invalid S3 endpoint {endpoint}: {e}")))?;
        let bucket = Bucket::new(endpoint_url, UrlStyle::Path, bucket_name.to_string(), "us-east-1")
            .map_err(|e| MuxfysError::config(format!("invalid S3 bucket config: {e}")))?;
        let credentials = Credentials::new(access_key, secret_key);
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| MuxfysError::remote(format!("failed to build HTTP client: {e}")))?;
        let target = format!("s3://{bucket_name}/{base_path}");

        Ok(S3Accessor {
            bucket,
            credentials,
            base_path: base_path.trim_matches('/').to_string(),
            client,
            target,
        })
    }

    fn key(&self, path: &str) -> String {
        self.remote_path(path)
    }

    fn get_range(&self, key: &str, range: Option<(i64, Option<i64>)>) -> MuxfysResult<Bytes> {
        let mut action = self.bucket.get_object(Some(&self.credentials), key);
        let url = action.sign(SIGNED_REQUEST_LIFETIME);

        let mut req = self.client.get(url);
        if let Some((start, end)) = range {
            let header = match end {
                Some(end) => format!("bytes={start}-{end}"),
                None => format!("bytes={start}-"),
            };
            req = req.header(reqwest::header::RANGE, header);
        }

        let resp = req
            .send()
            .map_err(|e| MuxfysError::remote(format!("GET {key} failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MuxfysError::not_found(key.to_string()));
        }
        if !resp.status().is_success() {
            return Err(MuxfysError::remote(format!(
                "GET {key} returned status {}",
                resp.status()
            )));
        }
        resp.bytes()
            .map_err(|e| MuxfysError::remote(format!("reading body of {key}: {e}")))
    }
}

impl RemoteAccessor for S3Accessor {
    fn list_entries(&self, dir: &str) -> MuxfysResult<Vec<RemoteEntry>> {
        let prefix = self.key(dir);
        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix
        } else {
            format!("{prefix}/")
        };

        let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
        action.with_prefix(&prefix);
        action.query_mut().insert("delimiter", "/");
        let url = action.sign(SIGNED_REQUEST_LIFETIME);

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| MuxfysError::remote(format!("LIST {prefix} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(MuxfysError::remote(format!(
                "LIST {prefix} returned status {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .map_err(|e| MuxfysError::remote(format!("reading list body: {e}")))?;
        let parsed = rusty_s3::actions::ListObjectsV2::parse_response(&body)
            .map_err(|e| MuxfysError::remote(format!("parsing list response: {e}")))?;

        let mut entries = Vec::new();
        for common_prefix in &parsed.common_prefixes {
            if let Some(name) = common_prefix.prefix.strip_prefix(&prefix) {
                entries.push(RemoteEntry {
                    name: name.to_string(),
                    size: 0,
                    mtime: 0,
                });
            }
        }
        for object in &parsed.contents {
            if let Some(name) = object.key.strip_prefix(&prefix) {
                if name.is_empty() {
                    continue;
                }
                let mtime = time::OffsetDateTime::parse(
                    &object.last_modified,
                    &time::format_description::well_known::Rfc3339,
                )
                .map(|t| t.unix_timestamp())
                .unwrap_or(0);
                entries.push(RemoteEntry {
                    name: name.to_string(),
                    size: object.size as i64,
                    mtime,
                });
            }
        }
        Ok(entries)
    }

    fn open_file(&self, path: &str) -> MuxfysResult<Box<dyn RemoteStream>> {
        let key = self.key(path);
        Ok(Box::new(S3Stream {
            accessor_client: self.client.clone(),
            bucket: self.bucket.clone(),
            credentials: self.credentials.clone(),
            key,
            pos: 0,
            buf: Vec::new(),
            buf_offset: 0,
        }))
    }

    fn download_file(&self, src: &str, dest: &Path) -> MuxfysResult<()> {
        let key = self.key(src);
        let data = self.get_range(&key, None)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &data)?;
        Ok(())
    }

    fn upload_file(&self, src: &Path, dest: &str, content_type: &str) -> MuxfysResult<()> {
        let key = self.key(dest);
        let data = fs::read(src)?;

        let mut action = self.bucket.put_object(Some(&self.credentials), &key);
        action.headers_mut().insert("content-type", content_type);
        let url = action.sign(SIGNED_REQUEST_LIFETIME);

        let resp = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .map_err(|e| MuxfysError::remote(format!("PUT {key} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(MuxfysError::remote(format!(
                "PUT {key} returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn copy_file(&self, src: &str, dest: &str) -> MuxfysResult<()> {
        let src_key = self.key(src);
        let dest_key = self.key(dest);
        let copy_source = format!("/{}/{}", self.bucket.name(), src_key);

        let mut action = self.bucket.put_object(Some(&self.credentials), &dest_key);
        action
            .headers_mut()
            .insert("x-amz-copy-source", copy_source.clone());
        let url = action.sign(SIGNED_REQUEST_LIFETIME);

        let resp = self
            .client
            .put(url)
            .header("x-amz-copy-source", copy_source)
            .send()
            .map_err(|e| MuxfysError::remote(format!("COPY {src_key}->{dest_key} failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MuxfysError::not_found(src_key));
        }
        if !resp.status().is_success() {
            return Err(MuxfysError::remote(format!(
                "COPY {src_key}->{dest_key} returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn delete_file(&self, path: &str) -> MuxfysResult<()> {
        let key = self.key(path);
        let mut action = self.bucket.delete_object(Some(&self.credentials), &key);
        let url = action.sign(SIGNED_REQUEST_LIFETIME);

        let resp = self
            .client
            .delete(url)
            .send()
            .map_err(|e| MuxfysError::remote(format!("DELETE {key} failed: {e}")))?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(MuxfysError::remote(format!(
            "DELETE {key} returned status {}",
            resp.status()
        )))
    }

    fn error_is_not_exists(&self, err: &MuxfysError) -> bool {
        matches!(err, MuxfysError::NotFound(_))
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn remote_path(&self, rel: &str) -> String {
        let rel = rel.trim_matches('/');
        if self.base_path.is_empty() {
            rel.to_string()
        } else if rel.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}/{}", self.base_path, rel)
        }
    }
}

/// Reads an object body one ranged GET at a time, re-issuing the request on
/// [`RemoteStream::seek_to`] since HTTP has no true stream seeking.
struct S3Stream {
    accessor_client: reqwest::blocking::Client,
    bucket: Bucket,
    credentials: Credentials,
    key: String,
    pos: i64,
    buf: Vec<u8>,
    buf_offset: i64,
}

impl S3Stream {
    fn fill(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() && self.buf_offset == self.pos {
            return Ok(());
        }
        let mut action = self.bucket.get_object(Some(&self.credentials), &self.key);
        let url = action.sign(SIGNED_REQUEST_LIFETIME);
        let resp = self
            .accessor_client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes={}-", self.pos))
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !resp.status().is_success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("GET {} returned status {}", self.key, resp.status()),
            ));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.buf_offset = self.pos;
        self.buf = bytes.to_vec();
        Ok(())
    }
}

impl Read for S3Stream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.fill()?;
        let consumed = (self.pos - self.buf_offset) as usize;
        let available = &self.buf[consumed.min(self.buf.len())..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n as i64;
        Ok(n)
    }
}

impl RemoteStream for S3Stream {
    fn seek_to(&mut self, offset: i64) -> MuxfysResult<()> {
        self.pos = offset.max(0);
        self.buf.clear();
        Ok(())
    }
}
