//! Site-level output files
//!
//! The per-variant HTML root holds the article files plus a small amount of
//! chrome: the directory skeleton, a 48×48 favicon, and the welcome page.

use crate::crawler::RunContext;
use crate::naming::{article_base, codepoint_prefix, encode_for_href, title_with_spaces};
use crate::{Result, WikimirError};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{info, warn};

/// Descriptions longer than this are cut at a codepoint boundary.
const MAX_DESCRIPTION_CODEPOINTS: usize = 80;

/// Creates the variant's directory skeleton
pub fn create_sub_dirs(html_root: &Path) -> Result<()> {
    for sub in ["s", "j", "m"] {
        std::fs::create_dir_all(html_root.join(sub))?;
    }
    Ok(())
}

/// Serialized article path inside the HTML root
pub fn article_path(html_root: &Path, title: &str) -> PathBuf {
    html_root.join(format!("{}.html", article_base(title)))
}

fn minify_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s+<").expect("minify regex is valid"))
}

/// Writes one rewritten article document
///
/// The cleaned JSON structure is serialized as-is; `minify-html` collapses
/// inter-tag whitespace first, `deflate-tmp-html` compresses the payload.
pub fn write_article(
    html_root: &Path,
    title: &str,
    doc: &Value,
    deflate: bool,
    minify: bool,
) -> Result<PathBuf> {
    let mut payload = serde_json::to_string(doc)?;
    if minify {
        payload = minify_regex().replace_all(&payload, "><").into_owned();
    }

    let path = article_path(html_root, title);
    if deflate {
        let file = std::fs::File::create(&path)?;
        let mut encoder = DeflateEncoder::new(file, Compression::default());
        encoder.write_all(payload.as_bytes())?;
        encoder.finish()?;
    } else {
        std::fs::write(&path, payload)?;
    }
    Ok(path)
}

/// Extracts the wiki's subtitle from its main page (`#siteSub`)
pub fn extract_subtitle(main_page_html: &str) -> Option<String> {
    let doc = Html::parse_document(main_page_html);
    let selector = Selector::parse("#siteSub").ok()?;
    let text: String = doc.select(&selector).next()?.text().collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(codepoint_prefix(trimmed, MAX_DESCRIPTION_CODEPOINTS).to_string())
    }
}

/// Fetches the wiki logo (or copies the configured favicon) and converts it
/// to the 48×48 `favicon.png` the archive format expects
pub async fn save_favicon(ctx: &RunContext, html_root: &Path) -> Result<()> {
    let source = html_root.join("favicon.src");

    if let Some(custom) = &ctx.config.archive.custom_favicon {
        std::fs::copy(custom, &source)?;
    } else {
        let Some(logo) = ctx.site.logo.clone() else {
            warn!("wiki reports no logo and no custom favicon configured");
            return Ok(());
        };
        let fetched = ctx.fetcher.fetch_or_empty(&logo).await;
        if fetched.is_empty() {
            warn!("favicon download failed, archive will have none");
            return Ok(());
        }
        std::fs::write(&source, &fetched.body)?;
    }

    let dest = html_root.join("favicon.png");
    let output = Command::new("convert")
        .arg(&source)
        .args(["-thumbnail", "48"])
        .arg(&dest)
        .output()
        .await?;
    std::fs::remove_file(&source).ok();

    if !output.status.success() {
        return Err(WikimirError::Media(crate::media::MediaError::Tool {
            tool: "convert",
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }));
    }
    info!("favicon written to {}", dest.display());
    Ok(())
}

/// Writes `index.htm`
///
/// A redirect to the configured main page when one is set; otherwise a
/// plain list of every mirrored article.
pub fn save_main_page(ctx: &RunContext, html_root: &Path) -> Result<()> {
    let path = html_root.join("index.htm");

    if ctx.config.archive.custom_main_page.is_some() {
        let main = ctx.main_page_title();
        let body = format!(
            "<html><head><meta charset=\"UTF-8\" /><title>{}</title>\
             <meta http-equiv=\"refresh\" content=\"0; URL={}.html\" /></head>\
             <body></body></html>\n",
            title_with_spaces(&main),
            encode_for_href(&article_base(&main))
        );
        std::fs::write(path, body)?;
        return Ok(());
    }

    let mut titles = ctx.article_titles();
    titles.sort();

    let mut body = String::from("<html><head><meta charset=\"UTF-8\" /><title>");
    body.push_str(ctx.site.sitename.as_deref().unwrap_or("Offline wiki"));
    body.push_str("</title></head><body><ul>\n");
    for title in &titles {
        body.push_str(&format!(
            "<li><a href=\"{}.html\">{}</a></li>\n",
            encode_for_href(&article_base(title)),
            title_with_spaces(title)
        ));
    }
    body.push_str("</ul></body></html>\n");

    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::shorten_filename;
    use tempfile::TempDir;

    #[test]
    fn test_create_sub_dirs() {
        let dir = TempDir::new().unwrap();
        create_sub_dirs(dir.path()).unwrap();
        assert!(dir.path().join("s").is_dir());
        assert!(dir.path().join("j").is_dir());
        assert!(dir.path().join("m").is_dir());
    }

    #[test]
    fn test_article_path_encodes_title() {
        let path = article_path(Path::new("/root"), "AC/DC");
        assert_eq!(path, PathBuf::from("/root/AC_DC.html"));
    }

    #[test]
    fn test_article_filename_truncated() {
        let long_title = "x".repeat(300);
        let path = article_path(Path::new("/root"), &long_title);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.len() <= 250);
        assert_eq!(name, shorten_filename(&format!("{}.html", long_title)));
    }

    #[test]
    fn test_write_article_plain() {
        let dir = TempDir::new().unwrap();
        let doc: Value = serde_json::json!({"lead": {"sections": []}});

        let path = write_article(dir.path(), "Paris", &doc, false, false).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_write_article_deflated_roundtrip() {
        use flate2::read::DeflateDecoder;
        use std::io::Read;

        let dir = TempDir::new().unwrap();
        let doc: Value = serde_json::json!({"lead": {"sections": [{"text": "<p>hi</p>"}]}});

        let path = write_article(dir.path(), "Paris", &doc, true, false).unwrap();
        let raw = std::fs::read(&path).unwrap();

        let mut decoder = DeflateDecoder::new(&raw[..]);
        let mut inflated = String::new();
        decoder.read_to_string(&mut inflated).unwrap();
        let parsed: Value = serde_json::from_str(&inflated).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_write_article_minified() {
        let dir = TempDir::new().unwrap();
        let doc: Value = serde_json::json!({"text": "<p>a</p>   <p>b</p>"});

        let path = write_article(dir.path(), "T", &doc, false, true).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<p>a</p><p>b</p>"));
    }

    #[test]
    fn test_extract_subtitle() {
        let html = r#"<html><body><div id="siteSub">From Wikipedia, the free encyclopedia</div></body></html>"#;
        assert_eq!(
            extract_subtitle(html).as_deref(),
            Some("From Wikipedia, the free encyclopedia")
        );
    }

    #[test]
    fn test_extract_subtitle_missing() {
        assert_eq!(extract_subtitle("<html><body></body></html>"), None);
    }

    #[test]
    fn test_extract_subtitle_empty_node() {
        let html = r#"<div id="siteSub">   </div>"#;
        assert_eq!(extract_subtitle(html), None);
    }
}
