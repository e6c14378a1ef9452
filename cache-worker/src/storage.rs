//! On-disk named caches.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   ledger-v1.0.0/                 one directory per cache name
//!     <sha256(url)>.json           {"url", "status", "headers", "body_b64"}
//! ```
//!
//! Records are written through a `.tmp` sibling and renamed into place, so a
//! reader never sees half a response.

use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use url::Url;

use crate::error::CacheError;
use crate::error::Result;
use crate::fetch::FetchResponse;

/// Cache names become directory names.
pub fn validate_cache_name(name: &str) -> Result<()> {
    if ledger_common::config::validator::is_cache_name(name) {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (creating if needed) the cache called `name`.
    pub async fn open(&self, name: &str) -> Result<Cache> {
        validate_cache_name(name)?;
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        Ok(Cache {
            name: name.to_string(),
            dir,
        })
    }

    /// Whether a cache called `name` exists.
    pub async fn has(&self, name: &str) -> bool {
        validate_cache_name(name).is_ok()
            && tokio::fs::metadata(self.root.join(name))
                .await
                .is_ok_and(|m| m.is_dir())
    }

    /// Names of every existing cache, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if let Some(name) = entry.file_name().to_str()
                && is_dir
                && validate_cache_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete the cache called `name`. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        validate_cache_name(name)?;
        let dir = self.root.join(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&dir, e)),
        }
    }
}

/// One named cache: a URL → response map.
#[derive(Debug, Clone)]
pub struct Cache {
    name: String,
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct CachedRecord {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body_b64: String,
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn record_path(&self, url: &Url) -> PathBuf {
        let digest = Sha256::digest(url.as_str().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{hex}.json"))
    }

    /// Stored response for `url`, if any.
    pub async fn lookup(&self, url: &Url) -> Result<Option<FetchResponse>> {
        let path = self.record_path(url);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.clone(),
            reason,
        };
        let record: CachedRecord =
            serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;
        if record.url != url.as_str() {
            return Err(corrupt(format!("holds {} instead", record.url)));
        }
        let body = BASE64
            .decode(record.body_b64)
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(Some(FetchResponse {
            status: record.status,
            headers: record.headers,
            body: body.into(),
        }))
    }

    /// Store `response` under `url`, replacing any previous copy.
    pub async fn put(&self, url: &Url, response: &FetchResponse) -> Result<()> {
        let record = CachedRecord {
            url: url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body_b64: BASE64.encode(&response.body),
        };
        let path = self.record_path(url);
        let json = serde_json::to_vec(&record).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        Ok(())
    }

    /// Remove the copy for `url`. Returns whether there was one.
    pub async fn remove(&self, url: &Url) -> Result<bool> {
        let path = self.record_path(url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }
}
