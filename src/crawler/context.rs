//! Shared state of one mirror run
//!
//! Configuration is read-only after startup; the article-id map is written
//! during enumeration and read-only afterwards; everything else mutable
//! lives in the coordination store.

use crate::cache::DiskCache;
use crate::config::Config;
use crate::crawler::api::{ApiClient, SiteInfo};
use crate::crawler::fetcher::Fetcher;
use crate::naming::canonical_title;
use crate::rewrite::MirrorIndex;
use crate::store::{KvStore, RunDbs, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::error;

/// Revision data for one enumerated article
#[derive(Debug, Clone)]
pub struct ArticleDetail {
    pub revision_id: u64,
    /// Revision UNIX timestamp
    pub timestamp: i64,
    /// `lat;lon` when geotagged
    pub coordinates: Option<String>,
}

impl ArticleDetail {
    /// Serializes to the detail record stored per title: `{"t": ..., "g": ...}`
    pub fn to_record(&self) -> String {
        let mut record = serde_json::Map::new();
        record.insert("t".to_string(), serde_json::json!(self.timestamp));
        if let Some(coords) = &self.coordinates {
            record.insert("g".to_string(), serde_json::json!(coords));
        }
        serde_json::Value::Object(record).to_string()
    }
}

/// Everything a run's components share
pub struct RunContext {
    pub config: Config,
    pub fetcher: Arc<Fetcher>,
    pub api: Arc<ApiClient>,
    pub store: Arc<dyn KvStore>,
    pub dbs: RunDbs,
    pub cache: DiskCache,
    pub site: SiteInfo,
    article_ids: RwLock<HashMap<String, ArticleDetail>>,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        fetcher: Arc<Fetcher>,
        api: Arc<ApiClient>,
        store: Arc<dyn KvStore>,
        dbs: RunDbs,
        cache: DiskCache,
        site: SiteInfo,
    ) -> Self {
        Self {
            config,
            fetcher,
            api,
            store,
            dbs,
            cache,
            site,
            article_ids: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a title to the article-id map and persists its detail record
    pub fn record_article(&self, title: &str, detail: ArticleDetail) {
        if let Err(e) = self
            .store
            .hset(&self.dbs.details(), title, &detail.to_record())
        {
            fatal_store_error(e);
        }
        if let Ok(mut ids) = self.article_ids.write() {
            ids.insert(title.to_string(), detail);
        }
    }

    /// Drops a title (missing article, empty API response)
    pub fn drop_article(&self, title: &str) {
        if let Err(e) = self.store.hdel(&self.dbs.details(), title) {
            fatal_store_error(e);
        }
        if let Ok(mut ids) = self.article_ids.write() {
            ids.remove(title);
        }
    }

    pub fn has_article(&self, title: &str) -> bool {
        self.article_ids
            .read()
            .map(|ids| ids.contains_key(title))
            .unwrap_or(false)
    }

    pub fn article_count(&self) -> usize {
        self.article_ids.read().map(|ids| ids.len()).unwrap_or(0)
    }

    /// Snapshot of all enumerated titles
    pub fn article_titles(&self) -> Vec<String> {
        self.article_ids
            .read()
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn article_detail(&self, title: &str) -> Option<ArticleDetail> {
        self.article_ids
            .read()
            .ok()
            .and_then(|ids| ids.get(title).cloned())
    }

    /// Canonical title of the welcome page
    pub fn main_page_title(&self) -> String {
        if let Some(custom) = &self.config.archive.custom_main_page {
            return canonical_title(custom);
        }
        self.site
            .mainpage
            .as_deref()
            .map(canonical_title)
            .unwrap_or_default()
    }

    /// Builds the read-only mirror test used by the rewriter
    pub fn mirror_index(&self) -> MirrorIndex {
        let titles: HashSet<String> = self
            .article_ids
            .read()
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default();

        let content_namespaces: HashSet<String> = self
            .site
            .namespaces
            .values()
            .filter(|ns| ns.content && !ns.name.is_empty())
            .map(|ns| ns.name.clone())
            .collect();

        let namespace_mode = self.config.crawl.article_list.is_none();
        MirrorIndex::new(titles, content_namespaces, namespace_mode)
    }
}

/// Store failures leave the coordination state inconsistent; the run cannot
/// continue past one
pub fn fatal_store_error(e: StoreError) -> ! {
    error!("fatal coordination store error: {}", e);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_record_with_coordinates() {
        let detail = ArticleDetail {
            revision_id: 42,
            timestamp: 1_700_000_000,
            coordinates: Some("48.858;2.2945".to_string()),
        };
        let record: serde_json::Value = serde_json::from_str(&detail.to_record()).unwrap();
        assert_eq!(record["t"], 1_700_000_000);
        assert_eq!(record["g"], "48.858;2.2945");
    }

    #[test]
    fn test_detail_record_without_coordinates() {
        let detail = ArticleDetail {
            revision_id: 42,
            timestamp: 123,
            coordinates: None,
        };
        let record: serde_json::Value = serde_json::from_str(&detail.to_record()).unwrap();
        assert_eq!(record["t"], 123);
        assert!(record.get("g").is_none());
    }
}
