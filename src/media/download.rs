//! Width-deduplicating media download stage
//!
//! Every media URL a rewrite pass emits lands here. The coordination store
//! keeps one width per filename base; a request at or below the recorded
//! width is dropped before any I/O happens, and the winning request records
//! its width *before* downloading so a concurrent request for the same file
//! cannot slip past. All widths of one file share a single cache slot keyed
//! by the width-stripped URL.

use crate::cache::{DiskCache, WIDTH_HEADER};
use crate::crawler::{Fetcher, WorkPool};
use crate::media::{optimize_file, MediaResult};
use crate::naming::parse_media_url;
use crate::store::{KvStore, RunDbs};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

fn width_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d+px-").expect("width regex is valid"))
}

/// Strips the scaled-width path prefix so every width of a file maps to the
/// same cache slot
fn width_normalized(url: &str) -> String {
    width_prefix_regex().replace(url, "/").into_owned()
}

/// Shared state of the download stage
pub struct MediaDownloader {
    fetcher: Arc<Fetcher>,
    cache: DiskCache,
    store: Arc<dyn KvStore>,
    dbs: RunDbs,
    /// `{htmlRoot}/m` of the variant being built
    media_dir: PathBuf,
    optimize_pool: WorkPool,
}

impl MediaDownloader {
    pub fn new(
        fetcher: Arc<Fetcher>,
        cache: DiskCache,
        store: Arc<dyn KvStore>,
        dbs: RunDbs,
        media_dir: PathBuf,
        optimize_pool: WorkPool,
    ) -> Self {
        Self {
            fetcher,
            cache,
            store,
            dbs,
            media_dir,
            optimize_pool,
        }
    }

    /// Handles one enqueued media URL
    ///
    /// Failures are logged and swallowed: an article referencing a missing
    /// file is acceptable, a dead run is not.
    pub async fn process(&self, url: &str) {
        if let Err(e) = self.process_inner(url).await {
            error!("media download failed for {}: {}", url, e);
        }
    }

    async fn process_inner(&self, url: &str) -> MediaResult<()> {
        let Some(parts) = parse_media_url(url) else {
            debug!("unparseable media url skipped: {}", url);
            return Ok(());
        };

        // queued -> locked: the width is recorded before any download so a
        // concurrent request for the same file sees it and drops out.
        let cache_key = width_normalized(url);
        let cache_path = self.cache.media_path(&cache_key, &parts.filename_base);
        let dest = self.media_dir.join(&parts.filename_base);

        let locked = self
            .store
            .hset_if_wider(&self.dbs.media(), &parts.filename_base, parts.width)?;
        if !locked {
            // A wider request already downloaded (or is downloading) this
            // file; just make sure the current tree links to it.
            if cache_path.is_file() {
                self.cache.link_into(&cache_path, &dest)?;
            }
            debug!(
                "{} already served at >= {}px",
                parts.filename_base, parts.width
            );
            return Ok(());
        }

        // A previous run may have cached this file at a sufficient width.
        if let Some(stored) = self.cache.stored_width(&cache_path)? {
            if stored >= parts.width && cache_path.is_file() {
                self.cache.touch(&cache_path);
                self.cache.link_into(&cache_path, &dest)?;
                if stored > parts.width {
                    self.store.hset(
                        &self.dbs.cached_media(),
                        &parts.filename_base,
                        &parts.width.to_string(),
                    )?;
                } else {
                    self.store
                        .hdel(&self.dbs.cached_media(), &parts.filename_base)?;
                }
                debug!("cache hit for {} ({}px)", parts.filename_base, stored);
                return Ok(());
            }
        }

        let fetched = self.fetcher.fetch(url).await?;
        if fetched.is_empty() {
            // No symlink; the article keeps its dangling reference.
            return Ok(());
        }

        let mut headers = HashMap::new();
        headers.insert(WIDTH_HEADER.to_string(), parts.width.to_string());
        self.cache.store(&cache_path, &fetched.body, &headers)?;

        // cached -> symlinked
        self.cache.link_into(&cache_path, &dest)?;
        info!(
            "downloaded {} ({} bytes at {}px)",
            parts.filename_base,
            fetched.body.len(),
            parts.width
        );

        let enqueued_len = fetched.body.len() as u64;
        self.optimize_pool.push(async move {
            optimize_file(&cache_path, enqueued_len).await;
        });

        Ok(())
    }
}
