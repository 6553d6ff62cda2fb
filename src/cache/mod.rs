//! Content-addressed disk cache for fetched bodies
//!
//! Entries are keyed by the SHA-1 of the source URL, truncated to 20 hex
//! characters. A body file is paired with a `.h` sibling holding the
//! response headers as JSON; a body without its sibling is invalid. Media
//! bodies live under `m/` and keep their extension so external optimizers
//! can infer the format.
//!
//! A `ref` sentinel written at run start anchors the staleness sweep:
//! entries touched during the run are refreshed to now, everything with an
//! older mtime is deleted when the run ends.

use filetime::FileTime;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Header field the cache adds to media entries to record the stored width.
pub const WIDTH_HEADER: &str = "width";

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header blob error: {0}")]
    Headers(#[from] serde_json::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Disk cache rooted at `{cache-directory}/{radical}/`
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the cache tree and writes the staleness sentinel
    pub fn prepare(&self) -> CacheResult<()> {
        fs::create_dir_all(self.root.join("m"))?;
        fs::write(self.sentinel_path(), b"")?;
        let now = FileTime::now();
        filetime::set_file_mtime(self.sentinel_path(), now)?;
        Ok(())
    }

    fn sentinel_path(&self) -> PathBuf {
        self.root.join("ref")
    }

    /// Hashes a URL to its cache key
    pub fn hash_url(url: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..20].to_string()
    }

    /// Cache path for a page body
    pub fn page_path(&self, url: &str) -> PathBuf {
        self.root.join(Self::hash_url(url))
    }

    /// Cache path for a media body, keeping the filename's extension
    pub fn media_path(&self, url: &str, filename_base: &str) -> PathBuf {
        let ext = filename_base
            .rfind('.')
            .map(|idx| &filename_base[idx..])
            .unwrap_or("");
        self.root.join("m").join(format!("{}{}", Self::hash_url(url), ext))
    }

    fn headers_path(body_path: &Path) -> PathBuf {
        let mut name = body_path.as_os_str().to_os_string();
        name.push(".h");
        PathBuf::from(name)
    }

    /// Looks up a cached entry
    ///
    /// A hit returns the body and the parsed header map, exactly what a
    /// fresh fetch would deliver, and refreshes the entry's mtime so the
    /// end-of-run sweep keeps it. A body whose `.h` sibling is missing or
    /// unreadable is treated as absent.
    pub fn lookup(&self, body_path: &Path) -> CacheResult<Option<(Vec<u8>, HashMap<String, String>)>> {
        if !body_path.is_file() {
            return Ok(None);
        }
        let headers_path = Self::headers_path(body_path);
        let headers_raw = match fs::read(&headers_path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("cache body without header sibling: {}", body_path.display());
                return Ok(None);
            }
        };
        let headers: HashMap<String, String> = match serde_json::from_slice(&headers_raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("corrupt header blob {}: {}", headers_path.display(), e);
                return Ok(None);
            }
        };
        let body = fs::read(body_path)?;

        self.touch(body_path);
        self.touch(&headers_path);

        Ok(Some((body, headers)))
    }

    /// Stores a body and its headers
    pub fn store(
        &self,
        body_path: &Path,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> CacheResult<()> {
        if let Some(parent) = body_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(body_path, body)?;
        let blob = serde_json::to_vec(headers)?;
        fs::write(Self::headers_path(body_path), blob)?;
        Ok(())
    }

    /// Reads the stored width of a media entry, if any
    pub fn stored_width(&self, body_path: &Path) -> CacheResult<Option<u32>> {
        let headers_path = Self::headers_path(body_path);
        let raw = match fs::read(&headers_path) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let headers: HashMap<String, String> = serde_json::from_slice(&raw)?;
        Ok(headers.get(WIDTH_HEADER).and_then(|w| w.parse().ok()))
    }

    /// Places a media file at `dest` as a symlink to the cache body,
    /// falling back to a copy where symlinks are unsupported
    pub fn link_into(&self, body_path: &Path, dest: &Path) -> CacheResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.exists() || dest.is_symlink() {
            fs::remove_file(dest)?;
        }
        #[cfg(unix)]
        {
            if std::os::unix::fs::symlink(body_path, dest).is_ok() {
                return Ok(());
            }
        }
        fs::copy(body_path, dest)?;
        Ok(())
    }

    /// Refreshes an entry's mtime so the sweep keeps it
    pub fn touch(&self, path: &Path) {
        let now = FileTime::now();
        if let Err(e) = filetime::set_file_mtime(path, now) {
            debug!("failed to refresh mtime of {}: {}", path.display(), e);
        }
    }

    /// Deletes every cache file older than the run sentinel
    ///
    /// Returns the number of files removed.
    pub fn sweep(&self) -> CacheResult<usize> {
        let sentinel = fs::metadata(self.sentinel_path())?;
        let cutoff = FileTime::from_last_modification_time(&sentinel);

        let mut removed = 0;
        for dir in [self.root.clone(), self.root.join("m")] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || path == self.sentinel_path() {
                    continue;
                }
                let meta = match entry.metadata() {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                if FileTime::from_last_modification_time(&meta) < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_cache() -> (TempDir, DiskCache) {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        cache.prepare().unwrap();
        (dir, cache)
    }

    #[test]
    fn test_hash_is_stable_and_short() {
        let a = DiskCache::hash_url("https://example.org/page");
        let b = DiskCache::hash_url("https://example.org/page");
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_differs_per_url() {
        assert_ne!(
            DiskCache::hash_url("https://example.org/a"),
            DiskCache::hash_url("https://example.org/b")
        );
    }

    #[test]
    fn test_store_then_lookup() {
        let (_dir, cache) = test_cache();
        let path = cache.page_path("https://example.org/page");
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        cache.store(&path, b"<html></html>", &headers).unwrap();
        let (body, loaded) = cache.lookup(&path).unwrap().unwrap();

        assert_eq!(body, b"<html></html>");
        assert_eq!(loaded.get("content-type").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let (_dir, cache) = test_cache();
        let path = cache.page_path("https://example.org/never-fetched");
        assert!(cache.lookup(&path).unwrap().is_none());
    }

    #[test]
    fn test_body_without_headers_is_invalid() {
        let (_dir, cache) = test_cache();
        let path = cache.page_path("https://example.org/partial");
        fs::write(&path, b"body").unwrap();
        assert!(cache.lookup(&path).unwrap().is_none());
    }

    #[test]
    fn test_media_path_keeps_extension() {
        let (_dir, cache) = test_cache();
        let path = cache.media_path("https://example.org/img", "Photo.jpg");
        assert!(path.to_string_lossy().ends_with(".jpg"));
        assert!(path.parent().unwrap().ends_with("m"));
    }

    #[test]
    fn test_stored_width_roundtrip() {
        let (_dir, cache) = test_cache();
        let path = cache.media_path("https://example.org/img.jpg", "img.jpg");
        let mut headers = HashMap::new();
        headers.insert(WIDTH_HEADER.to_string(), "300".to_string());
        cache.store(&path, b"jpegdata", &headers).unwrap();

        assert_eq!(cache.stored_width(&path).unwrap(), Some(300));
    }

    #[test]
    fn test_link_into_creates_dest() {
        let (dir, cache) = test_cache();
        let body = cache.media_path("https://example.org/img.jpg", "img.jpg");
        cache.store(&body, b"jpegdata", &HashMap::new()).unwrap();

        let dest = dir.path().join("out").join("m").join("img.jpg");
        cache.link_into(&body, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"jpegdata");
    }

    #[test]
    fn test_link_into_replaces_existing() {
        let (dir, cache) = test_cache();
        let body = cache.media_path("https://example.org/img.jpg", "img.jpg");
        cache.store(&body, b"new", &HashMap::new()).unwrap();

        let dest = dir.path().join("m").join("img.jpg");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"old").unwrap();

        cache.link_into(&body, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_sweep_removes_stale_keeps_fresh() {
        let (_dir, cache) = test_cache();

        let stale = cache.page_path("https://example.org/stale");
        cache.store(&stale, b"old", &HashMap::new()).unwrap();
        // Backdate both files well before the sentinel.
        let old = FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&stale, old).unwrap();
        filetime::set_file_mtime(stale.with_extension("h"), old).ok();

        let fresh = cache.page_path("https://example.org/fresh");
        cache.store(&fresh, b"new", &HashMap::new()).unwrap();

        let removed = cache.sweep().unwrap();
        assert!(removed >= 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
