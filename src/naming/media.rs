//! Media URL parsing and local filename derivation
//!
//! Upload URLs carry the original filename, an optional scaled-width prefix
//! and up to two extensions, e.g.
//! `.../f/f4/Tour_Eiffel.jpg/250px-Tour_Eiffel.jpg` or
//! `.../math/2/8/a/28a....svg/14px-28a....svg.png`. One regular expression
//! splits them; the derived filename base is what the dedup store and the
//! media directory are keyed by.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;

use super::title::shorten_filename;

/// Width recorded for media requested without a `NNNpx-` prefix.
///
/// Full-size downloads satisfy every scaled request, so they compare as
/// wider than any real width.
pub const FULL_WIDTH: u32 = 9_999_999;

/// A media URL decomposed into its dedup key and requested width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUrlParts {
    /// Filename the download is deduplicated and stored under
    pub filename_base: String,
    /// Requested width in pixels, [`FULL_WIDTH`] when unscaled
    pub width: u32,
}

fn media_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*/)([^/]+)(/)(\d+px-|)(.+?)(\.[A-Za-z0-9]{2,6}|)(\.[A-Za-z0-9]{2,6}|)$")
            .expect("media regex is valid")
    })
}

/// Parses a media URL into its filename base and requested width
///
/// Returns `None` when the URL does not look like an upload path; callers
/// drop such references.
pub fn parse_media_url(url: &str) -> Option<MediaUrlParts> {
    let decoded = percent_decode_str(url).decode_utf8().ok()?;
    let caps = media_regex().captures(&decoded)?;

    let dir_filename = caps.get(2).map_or("", |m| m.as_str());
    let width_prefix = caps.get(4).map_or("", |m| m.as_str());
    let base_name = caps.get(5).map_or("", |m| m.as_str());
    let first_ext = caps.get(6).map_or("", |m| m.as_str());
    let second_ext = caps.get(7).map_or("", |m| m.as_str());

    // Math renderings arrive extension-less in the path segment; they are
    // SVG sources rendered to PNG.
    let ext = if first_ext.is_empty() { ".svg" } else { first_ext };
    let assembled = format!("{}{}{}", base_name, ext, second_ext);

    let filename_base = if dir_filename.len() > assembled.len() {
        dir_filename.to_string()
    } else {
        assembled
    };

    let width = if width_prefix.is_empty() {
        FULL_WIDTH
    } else {
        width_prefix
            .trim_end_matches("px-")
            .parse()
            .unwrap_or(FULL_WIDTH)
    };

    Some(MediaUrlParts {
        filename_base: shorten_filename(&filename_base),
        width,
    })
}

/// Derives the local media filename for a URL, if it is rewritable
pub fn media_base(url: &str) -> Option<String> {
    parse_media_url(url).map(|parts| parts.filename_base)
}
