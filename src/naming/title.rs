//! Canonical titles and article filename stems
//!
//! Titles travel through the system in their canonical form: spaces replaced
//! by underscores, case preserved. The filename stem for an article is the
//! canonical title percent-encoded with `/` mapped to `_`, truncated so that
//! the final `.html` filename never exceeds the 250-byte filesystem ceiling.

use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Longest filename (in UTF-8 bytes, extension included) written to disk.
const MAX_FILENAME_BYTES: usize = 249;

/// Bytes truncated filenames keep for the base before the hash suffix.
const TRUNCATED_BASE_BYTES: usize = 239;

/// Characters escaped in filename stems and local hrefs.
///
/// Mirrors `encodeURIComponent`: everything except alphanumerics and
/// `- _ . ! ~ * ' ( )` is percent-encoded.
const FILENAME_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Converts a title to its canonical form
///
/// Spaces become underscores, trailing carriage returns are stripped, case
/// is preserved. Canonical titles are the keys used in the coordination
/// store and the article-id map.
///
/// # Examples
///
/// ```
/// use wikimir::naming::canonical_title;
///
/// assert_eq!(canonical_title("Main Page"), "Main_Page");
/// assert_eq!(canonical_title("Rust (programming language)\r"), "Rust_(programming_language)");
/// ```
pub fn canonical_title(title: &str) -> String {
    title.trim_end_matches('\r').replace(' ', "_")
}

/// Converts a canonical title back to its display form (underscores to spaces)
pub fn title_with_spaces(title: &str) -> String {
    title.replace('_', " ")
}

/// Percent-encodes a string for use inside a local href
pub fn encode_for_href(s: &str) -> String {
    utf8_percent_encode(s, FILENAME_ESCAPE).to_string()
}

/// Derives the filename stem for an article
///
/// The canonical title is percent-encoded with `/` mapped to `_` (a `/`
/// would otherwise introduce a directory level). The stem is truncated so
/// that `{stem}.html` stays under the filename ceiling; truncated stems gain
/// a two-character MD5 suffix to keep distinct long titles distinct.
///
/// Decoding the stem yields the title again, except that `/` has been
/// flattened to `_` (re-encoding the decoded form is idempotent).
pub fn article_base(title: &str) -> String {
    let flattened = title.replace('/', "_");
    let encoded = utf8_percent_encode(&flattened, FILENAME_ESCAPE).to_string();
    let filename = shorten_filename(&format!("{}.html", encoded));
    match filename.strip_suffix(".html") {
        Some(stem) => stem.to_string(),
        None => filename,
    }
}

/// Truncates a filename to the on-disk ceiling, UTF-8 safely
///
/// Filenames at or under the ceiling pass through unchanged. Longer names
/// keep the first `239 - len(ext)` bytes of the base (never splitting a
/// UTF-8 sequence), then append the first two hex characters of the MD5 of
/// the full base and the original extension.
pub fn shorten_filename(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }

    let (base, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    };

    let keep = TRUNCATED_BASE_BYTES.saturating_sub(ext.len());
    let truncated = truncate_utf8(base, keep);

    let mut hasher = Md5::new();
    hasher.update(base.as_bytes());
    let digest = hasher.finalize();
    let suffix = format!("{:02x}", digest[0]);

    if ext.is_empty() {
        format!("{}{}", truncated, suffix)
    } else {
        format!("{}{}.{}", truncated, suffix, ext)
    }
}

/// Returns the longest prefix of `s` that fits in `max_bytes` bytes
///
/// Never splits a multi-byte UTF-8 sequence.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Returns the first `k` codepoints of `s`
///
/// Indexing is by codepoint, so the cut never lands inside a character no
/// matter how the title is encoded upstream.
pub fn codepoint_prefix(s: &str, k: usize) -> &str {
    match s.char_indices().nth(k) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_title_spaces() {
        assert_eq!(canonical_title("Main Page"), "Main_Page");
    }

    #[test]
    fn test_canonical_title_strips_cr() {
        assert_eq!(canonical_title("Title\r"), "Title");
    }

    #[test]
    fn test_canonical_title_preserves_case() {
        assert_eq!(canonical_title("iPhone"), "iPhone");
    }

    #[test]
    fn test_title_with_spaces_roundtrip() {
        assert_eq!(title_with_spaces("Main_Page"), "Main Page");
    }

    #[test]
    fn test_article_base_plain() {
        assert_eq!(article_base("Main_Page"), "Main_Page");
    }

    #[test]
    fn test_article_base_slash_flattened() {
        assert_eq!(article_base("AC/DC"), "AC_DC");
    }

    #[test]
    fn test_article_base_encodes_special_chars() {
        assert_eq!(article_base("C++"), "C%2B%2B");
        assert_eq!(article_base("Q?A"), "Q%3FA");
    }

    #[test]
    fn test_article_base_decodes_back() {
        let title = "Rust_(programming_language)";
        let base = article_base(title);
        let decoded = percent_encoding::percent_decode_str(&base)
            .decode_utf8()
            .unwrap();
        assert_eq!(decoded, title);
    }

    #[test]
    fn test_article_base_idempotent_under_reencode() {
        let title = "Moscow/Kremlin";
        let base = article_base(title);
        let decoded = percent_encoding::percent_decode_str(&base)
            .decode_utf8()
            .unwrap()
            .to_string();
        // Decoding flattens the slash permanently; encoding again is stable.
        assert_eq!(article_base(&decoded), base);
    }

    #[test]
    fn test_shorten_filename_short_passthrough() {
        assert_eq!(shorten_filename("page.html"), "page.html");
    }

    #[test]
    fn test_shorten_filename_long_ascii() {
        let base = "a".repeat(300);
        let name = format!("{}.html", base);
        let shortened = shorten_filename(&name);

        assert!(shortened.len() <= 250);
        assert!(shortened.ends_with(".html"));
        // 239 - len("html") = 235 bytes of base, then 2 hex chars.
        assert_eq!(shortened.len(), 235 + 2 + 1 + 4);
    }

    #[test]
    fn test_shorten_filename_stable_suffix() {
        let base = "b".repeat(300);
        let name = format!("{}.html", base);
        assert_eq!(shorten_filename(&name), shorten_filename(&name));
    }

    #[test]
    fn test_shorten_filename_distinct_for_distinct_bases() {
        let long_a = format!("{}x.html", "c".repeat(299));
        let long_b = format!("{}y.html", "c".repeat(299));
        // Same truncated prefix, different hash input.
        assert_eq!(
            truncate_utf8(&long_a, 235),
            truncate_utf8(&long_b, 235)
        );
        assert_ne!(shorten_filename(&long_a), shorten_filename(&long_b));
    }

    #[test]
    fn test_shorten_filename_multibyte_boundary() {
        // 'é' is two bytes in UTF-8; the cut must never split one.
        let base = "é".repeat(200);
        let name = format!("{}.html", base);
        let shortened = shorten_filename(&name);
        assert!(shortened.len() <= 250);
        assert!(std::str::from_utf8(shortened.as_bytes()).is_ok());
    }

    #[test]
    fn test_truncate_utf8_ascii() {
        assert_eq!(truncate_utf8("hello", 3), "hel");
    }

    #[test]
    fn test_truncate_utf8_multibyte() {
        // "éé" is 4 bytes; a 3-byte budget keeps only the first char.
        assert_eq!(truncate_utf8("éé", 3), "é");
    }

    #[test]
    fn test_codepoint_prefix_within_bounds() {
        assert_eq!(codepoint_prefix("hello", 2), "he");
    }

    #[test]
    fn test_codepoint_prefix_past_end() {
        assert_eq!(codepoint_prefix("hi", 10), "hi");
    }

    #[test]
    fn test_codepoint_prefix_astral() {
        // Each emoji is a single codepoint (a surrogate pair in UTF-16).
        let s = "𝕎𝕚𝕜𝕚";
        assert_eq!(codepoint_prefix(s, 2), "𝕎𝕚");
    }
}
