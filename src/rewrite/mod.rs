//! HTML rewriter for article sections
//!
//! Takes one article's mobile-sections JSON and rewrites every section's
//! HTML in place: media references are repointed at the local `m/`
//! directory (and queued for download), map-service links become `geo:`
//! URIs, chrome-only elements are stripped. The transformation is
//! deterministic: rewriting the same input twice yields identical output.

mod dom;
mod geo;

pub use geo::translate_geo_link;

use crate::naming::{canonical_title, encode_for_href, media_base};
use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

/// Elements removed by id.
const ID_BLACKLIST: &[&str] = &["purgelink"];

/// Elements removed by class, unconditionally.
const CLASS_BLACKLIST: &[&str] = &[
    "noprint",
    "metadata",
    "ambox",
    "stub",
    "topicon",
    "magnify",
    "navbar",
    "mwe-math-mathml-inline",
];

/// Elements removed by class only when they contain no link.
const CLASS_BLACKLIST_IF_NO_LINK: &[&str] =
    &["mainarticle", "seealso", "dablink", "rellink", "hatnote"];

/// Elements whose inline `display` is cleared so they stay visible offline.
const CLASS_FORCE_DISPLAY: &[&str] = &["thumb"];

/// Class marking math fallback renderings kept even in `nopic` dumps.
const MATH_IMAGE_CLASS: &str = "mwe-math-fallback-image-inline";

/// `typeof` value marking math extension output.
const MATH_TYPEOF: &str = "mw:Extension/math";

/// Knows which link targets resolve to mirrored articles
///
/// Built once after title enumeration; read-only afterwards.
#[derive(Debug, Default)]
pub struct MirrorIndex {
    titles: HashSet<String>,
    content_namespaces: HashSet<String>,
    namespace_mode: bool,
}

impl MirrorIndex {
    pub fn new(
        titles: HashSet<String>,
        content_namespaces: HashSet<String>,
        namespace_mode: bool,
    ) -> Self {
        Self {
            titles,
            content_namespaces: content_namespaces
                .into_iter()
                .map(|ns| canonical_title(&ns))
                .collect(),
            namespace_mode,
        }
    }

    /// Whether a link target lands inside the mirror
    ///
    /// True when the title was enumerated, or (in namespace mode) when
    /// its prefix names a content namespace.
    pub fn is_mirrored(&self, target: &str) -> bool {
        if target.is_empty() {
            return false;
        }
        if self.titles.contains(target) {
            return true;
        }
        if self.namespace_mode {
            if let Some((prefix, _)) = target.split_once(':') {
                return self.content_namespaces.contains(&canonical_title(prefix));
            }
        }
        false
    }
}

/// Per-article rewrite parameters
pub struct RewriteContext<'a> {
    /// Strip images (math renderings excepted)
    pub nopic: bool,
    /// Keep paragraphs left empty by the other passes
    pub keep_empty_paragraphs: bool,
    /// Leading path of article links on this wiki (`/wiki/`)
    pub article_path_prefix: &'a str,
    /// Base the wiki is served from, for resolving relative media sources
    pub base_url: &'a Url,
    pub mirror: &'a MirrorIndex,
}

/// What a rewrite pass produced besides the mutated document
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Absolute media URLs to download, deduplicated within the pass
    pub media_urls: Vec<String>,
}

/// Rewrites one article's mobile-sections JSON in place
pub fn rewrite_article(doc: &mut Value, ctx: &RewriteContext) -> RewriteOutcome {
    let mut seen = HashSet::new();
    let mut media_urls = Vec::new();

    for part in ["lead", "remaining"] {
        if let Some(sections) = doc
            .get_mut(part)
            .and_then(|p| p.get_mut("sections"))
            .and_then(Value::as_array_mut)
        {
            for section in sections {
                let Some(text) = section.get("text").and_then(Value::as_str) else {
                    continue;
                };
                let rewritten = rewrite_section_html(text, ctx, &mut seen, &mut media_urls);
                section["text"] = Value::String(rewritten);
            }
        }
    }

    rewrite_lead_metadata(doc, ctx, &mut seen, &mut media_urls);

    RewriteOutcome { media_urls }
}

/// Lead image thumbnails and the pronunciation clip get the same treatment
/// as inline media
fn rewrite_lead_metadata(
    doc: &mut Value,
    ctx: &RewriteContext,
    seen: &mut HashSet<String>,
    media_urls: &mut Vec<String>,
) {
    if let Some(urls) = doc
        .get_mut("lead")
        .and_then(|l| l.get_mut("image"))
        .and_then(|i| i.get_mut("urls"))
        .and_then(Value::as_object_mut)
    {
        for value in urls.values_mut() {
            if let Some(rewritten) = rewrite_media_url_value(value, ctx, seen, media_urls) {
                *value = Value::String(rewritten);
            }
        }
    }

    if let Some(url) = doc
        .get_mut("lead")
        .and_then(|l| l.get_mut("pronunciation"))
        .and_then(|p| p.get_mut("url"))
    {
        if let Some(rewritten) = rewrite_media_url_value(url, ctx, seen, media_urls) {
            *url = Value::String(rewritten);
        }
    }
}

fn rewrite_media_url_value(
    value: &Value,
    ctx: &RewriteContext,
    seen: &mut HashSet<String>,
    media_urls: &mut Vec<String>,
) -> Option<String> {
    let raw = value.as_str()?;
    let absolute = absolutize(ctx.base_url, raw);
    let base = media_base(&absolute)?;
    if seen.insert(absolute.clone()) {
        media_urls.push(absolute);
    }
    Some(format!("m/{}", encode_for_href(&base)))
}

/// Rewrites one section's HTML fragment
pub fn rewrite_section_html(
    html: &str,
    ctx: &RewriteContext,
    seen: &mut HashSet<String>,
    media_urls: &mut Vec<String>,
) -> String {
    let mut doc = Html::parse_fragment(html);

    rewrite_media_elements(&mut doc, ctx, seen, media_urls);
    rewrite_links(&mut doc);
    apply_blacklists(&mut doc);
    if !ctx.keep_empty_paragraphs {
        drop_empty_paragraphs(&mut doc);
    }

    dom::serialize_fragment(&doc)
}

fn selector(css: &str) -> Selector {
    // The selectors in this module are literals; parsing cannot fail.
    Selector::parse(css).expect("static selector")
}

fn rewrite_media_elements(
    doc: &mut Html,
    ctx: &RewriteContext,
    seen: &mut HashSet<String>,
    media_urls: &mut Vec<String>,
) {
    if ctx.nopic {
        for id in dom::select_ids(doc, &selector("map")) {
            dom::detach(doc, id);
        }
    }

    for img_id in dom::select_ids(doc, &selector("img")) {
        if ctx.nopic && !is_math_image(doc, img_id) {
            dom::detach(doc, img_id);
            continue;
        }

        let Some(src) = dom::get_attr(doc, img_id, "src") else {
            dom::detach(doc, img_id);
            continue;
        };

        // FilePath sources resolve through the live wiki only; they are not
        // rewritable and stay as they are.
        if src.starts_with("./Special:FilePath/") {
            continue;
        }

        let absolute = absolutize(ctx.base_url, &src);
        let Some(base) = media_base(&absolute) else {
            dom::detach(doc, img_id);
            continue;
        };

        unwrap_non_mirrored_link(doc, img_id, ctx);

        dom::set_attr(doc, img_id, "src", &format!("m/{}", encode_for_href(&base)));
        dom::remove_attr(doc, img_id, "resource");
        dom::remove_attr(doc, img_id, "srcset");

        if seen.insert(absolute.clone()) {
            media_urls.push(absolute);
        }
    }
}

/// Unwraps the `<a>` around an image unless it points at a mirrored article
fn unwrap_non_mirrored_link(doc: &mut Html, img_id: ego_tree::NodeId, ctx: &RewriteContext) {
    let Some((parent_id, parent_name)) = dom::parent_element(doc, img_id) else {
        return;
    };
    if parent_name != "a" {
        return;
    }

    let href = dom::get_attr(doc, parent_id, "href").unwrap_or_default();
    let target = extract_target_id_from_href(&href, ctx.article_path_prefix);
    if !ctx.mirror.is_mirrored(&target) {
        dom::unwrap_node(doc, parent_id);
    }
}

fn is_math_image(doc: &Html, id: ego_tree::NodeId) -> bool {
    let class_is_math = dom::get_attr(doc, id, "class")
        .map(|raw| raw.split_whitespace().any(|c| c == MATH_IMAGE_CLASS))
        .unwrap_or(false);
    let typeof_is_math = dom::get_attr(doc, id, "typeof")
        .map(|t| t == MATH_TYPEOF)
        .unwrap_or(false);
    class_is_math || typeof_is_math
}

fn rewrite_links(doc: &mut Html) {
    for id in dom::select_ids(doc, &selector("a, area")) {
        let Some(href) = dom::get_attr(doc, id, "href") else {
            continue;
        };
        if let Some(geo) = translate_geo_link(&href) {
            dom::set_attr(doc, id, "href", &geo);
        }
    }
}

fn apply_blacklists(doc: &mut Html) {
    let all = selector("*");

    let mut to_detach = Vec::new();
    let mut to_clear_display = Vec::new();

    for el in doc.select(&all) {
        let id = el.id();

        if let Some(el_id) = el.value().attr("id") {
            if ID_BLACKLIST.contains(&el_id) {
                to_detach.push(id);
                continue;
            }
        }

        if dom::has_class_from(&el, CLASS_BLACKLIST) {
            to_detach.push(id);
            continue;
        }

        if dom::has_class_from(&el, CLASS_BLACKLIST_IF_NO_LINK) && !dom::has_descendant(doc, id, "a")
        {
            to_detach.push(id);
            continue;
        }

        if dom::has_class_from(&el, CLASS_FORCE_DISPLAY) {
            to_clear_display.push(id);
        }
    }

    for id in to_detach {
        dom::detach(doc, id);
    }
    for id in to_clear_display {
        dom::clear_display(doc, id);
    }
}

fn drop_empty_paragraphs(doc: &mut Html) {
    for id in dom::select_ids(doc, &selector("p")) {
        if !dom::has_text(doc, id) && !dom::has_descendant(doc, id, "img") {
            dom::detach(doc, id);
        }
    }
}

/// Extracts the linked article title from an href
///
/// Local article links come as `./Title` or `{wiki-path}/Title`; anything
/// else yields the empty string. The extracted title is percent-decoded.
pub fn extract_target_id_from_href(href: &str, article_path_prefix: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }

    let path = match Url::parse(href) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => href
            .split(['#', '?'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let raw = if let Some(rest) = path.strip_prefix("./") {
        rest
    } else if let Some(rest) = path.strip_prefix(article_path_prefix) {
        rest
    } else {
        return String::new();
    };

    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_default()
}

/// Resolves a media source against the wiki base
fn absolutize(base: &Url, src: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), rest);
    }
    match base.join(src) {
        Ok(url) => url.to_string(),
        Err(_) => src.to_string(),
    }
}
