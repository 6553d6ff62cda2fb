use crate::naming::DumpVariant;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for wikimir
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wiki: WikiConfig,
    pub contact: ContactConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Upstream wiki endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct WikiConfig {
    /// Base URL of the wiki (e.g. `https://en.wikipedia.org/`)
    pub url: String,

    /// Path of the action API relative to the base URL
    #[serde(rename = "api-path", default = "default_api_path")]
    pub api_path: String,

    /// Path prefix articles live under (`/wiki/Title`)
    #[serde(rename = "wiki-path", default = "default_wiki_path")]
    pub wiki_path: String,

    /// Alternative base for the rendered-content REST endpoint
    #[serde(rename = "parsoid-url")]
    pub parsoid_url: Option<String>,

    /// Credentials for private wikis
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
}

/// Operator identification
#[derive(Debug, Clone, Deserialize)]
pub struct ContactConfig {
    /// Email advertised in the User-Agent; requests without a working
    /// contact address get wikis' crawlers blocked
    #[serde(rename = "admin-email")]
    pub admin_email: String,

    /// Publisher recorded in the archive metadata
    #[serde(default)]
    pub publisher: String,
}

/// Local file tree locations and intermediate-output switches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the per-variant HTML trees and archives are written to
    pub directory: PathBuf,

    /// Scratch directory (redirect index, coordination store)
    #[serde(rename = "tmp-directory")]
    pub tmp_directory: PathBuf,

    /// Root of the shared download cache
    #[serde(rename = "cache-directory")]
    pub cache_directory: PathBuf,

    /// Override for the coordination store location
    #[serde(rename = "state-db")]
    pub state_db: Option<PathBuf>,

    /// Deflate-compress intermediate article HTML
    #[serde(rename = "deflate-tmp-html")]
    pub deflate_tmp_html: bool,

    /// Keep the HTML tree after the archive is built
    #[serde(rename = "keep-html")]
    pub keep_html: bool,

    /// Collapse insignificant whitespace in article HTML
    #[serde(rename = "minify-html")]
    pub minify_html: bool,

    /// Write per-redirect HTML files instead of index entries only
    #[serde(rename = "write-html-redirects")]
    pub write_html_redirects: bool,

    /// Ask the archive builder for a full-text index
    #[serde(rename = "with-full-text-index")]
    pub with_full_text_index: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("out"),
            tmp_directory: PathBuf::from("tmp"),
            cache_directory: PathBuf::from("cache"),
            state_db: None,
            deflate_tmp_html: false,
            keep_html: false,
            minify_html: false,
            write_html_redirects: false,
            with_full_text_index: false,
        }
    }
}

/// Crawl behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Titles file enabling file mode (one title per line); absent means
    /// namespace enumeration
    #[serde(rename = "article-list")]
    pub article_list: Option<PathBuf>,

    /// Multiplier on the CPU count for the article queue width
    pub speed: usize,

    /// Base HTTP timeout in seconds (scaled by retry attempt)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Skip dump variants whose archive already exists
    pub resume: bool,

    /// Always refetch page bodies instead of consulting the cache
    #[serde(rename = "skip-html-cache")]
    pub skip_html_cache: bool,

    /// Leave stale cache entries in place at the end of the run
    #[serde(rename = "skip-cache-cleaning")]
    pub skip_cache_cleaning: bool,

    /// Keep paragraphs that end up empty after rewriting
    #[serde(rename = "keep-empty-paragraphs")]
    pub keep_empty_paragraphs: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            article_list: None,
            speed: 1,
            request_timeout: 60,
            resume: false,
            skip_html_cache: false,
            skip_cache_cleaning: false,
            keep_empty_paragraphs: false,
        }
    }
}

/// Archive flavors and metadata overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Variant selectors; each is a comma-separated subset of
    /// `nopic`/`nozim`, `""` being the full dump
    pub formats: Vec<String>,

    /// Favicon source overriding the wiki's logo
    #[serde(rename = "custom-favicon")]
    pub custom_favicon: Option<PathBuf>,

    #[serde(rename = "custom-title")]
    pub custom_title: Option<String>,

    #[serde(rename = "custom-description")]
    pub custom_description: Option<String>,

    /// Article used as the archive welcome page
    #[serde(rename = "custom-main-page")]
    pub custom_main_page: Option<String>,

    /// Override for the generated filename radical prefix
    #[serde(rename = "filename-prefix")]
    pub filename_prefix: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            formats: vec![String::new()],
            custom_favicon: None,
            custom_title: None,
            custom_description: None,
            custom_main_page: None,
            filename_prefix: None,
        }
    }
}

fn default_api_path() -> String {
    "w/api.php".to_string()
}

fn default_wiki_path() -> String {
    "wiki".to_string()
}

impl Config {
    /// Full URL of the action API
    pub fn api_url(&self) -> String {
        format!(
            "{}/{}",
            self.wiki.url.trim_end_matches('/'),
            self.wiki.api_path.trim_start_matches('/')
        )
    }

    /// Base URL of the rendered-content REST endpoint
    pub fn rest_url(&self) -> String {
        let base = self
            .wiki
            .parsoid_url
            .as_deref()
            .unwrap_or(&self.wiki.url);
        format!(
            "{}/api/rest_v1/page/mobile-sections",
            base.trim_end_matches('/')
        )
    }

    /// Leading path of article links on this wiki (`/wiki/`)
    pub fn article_path_prefix(&self) -> String {
        format!("/{}/", self.wiki.wiki_path.trim_matches('/'))
    }

    /// Article fetch/rewrite queue width
    pub fn speed(&self) -> usize {
        (num_cpus::get() * self.crawl.speed).max(1)
    }

    /// The dump variants this run produces, in configured order
    pub fn variants(&self) -> Vec<DumpVariant> {
        self.archive
            .formats
            .iter()
            .filter_map(|spec| DumpVariant::parse(spec))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
            [wiki]
            url = "https://en.wikipedia.org/"

            [contact]
            admin-email = "ops@example.org"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = minimal_config();
        assert_eq!(config.wiki.api_path, "w/api.php");
        assert_eq!(config.wiki.wiki_path, "wiki");
        assert_eq!(config.crawl.request_timeout, 60);
        assert_eq!(config.crawl.speed, 1);
        assert_eq!(config.archive.formats, vec![String::new()]);
    }

    #[test]
    fn test_api_url_joins_cleanly() {
        let config = minimal_config();
        assert_eq!(config.api_url(), "https://en.wikipedia.org/w/api.php");
    }

    #[test]
    fn test_rest_url_default() {
        let config = minimal_config();
        assert_eq!(
            config.rest_url(),
            "https://en.wikipedia.org/api/rest_v1/page/mobile-sections"
        );
    }

    #[test]
    fn test_rest_url_prefers_parsoid() {
        let mut config = minimal_config();
        config.wiki.parsoid_url = Some("https://parsoid.example.org".to_string());
        assert!(config.rest_url().starts_with("https://parsoid.example.org/"));
    }

    #[test]
    fn test_article_path_prefix() {
        let config = minimal_config();
        assert_eq!(config.article_path_prefix(), "/wiki/");
    }

    #[test]
    fn test_variants_parsed() {
        let mut config = minimal_config();
        config.archive.formats = vec!["".to_string(), "nopic".to_string()];
        let variants = config.variants();
        assert_eq!(variants.len(), 2);
        assert!(!variants[0].nopic);
        assert!(variants[1].nopic);
    }
}
