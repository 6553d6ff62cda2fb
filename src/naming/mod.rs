//! Naming rules shared across the pipeline
//!
//! This module holds the pure string transformations the rest of the crate
//! agrees on: canonical title form, article filename stems, media filename
//! derivation, and the filename radical used for output directories and the
//! final archive name.

mod media;
mod radical;
mod title;

pub use media::{media_base, parse_media_url, MediaUrlParts, FULL_WIDTH};
pub use radical::{creator_from_host, filename_radical, lang_suffix, DumpVariant};
pub use title::{
    article_base, canonical_title, codepoint_prefix, encode_for_href, shorten_filename,
    title_with_spaces, truncate_utf8,
};
