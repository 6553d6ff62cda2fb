//! Filename radical and dump variant naming
//!
//! The radical is the stem shared by the HTML root directory, the cache
//! directory and the final archive name: creator, language suffix, optional
//! selection name, picture mode, and (for the archive only) the month.

use chrono::{Datelike, Utc};

/// One output flavor of a run
///
/// `nopic` strips images, `nozim` stops after the file tree is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DumpVariant {
    pub nopic: bool,
    pub nozim: bool,
}

impl DumpVariant {
    /// Parses a variant selector such as `""`, `"nopic"` or `"nopic,nozim"`
    pub fn parse(spec: &str) -> Option<Self> {
        let mut variant = DumpVariant::default();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "nopic" => variant.nopic = true,
                "nozim" => variant.nozim = true,
                _ => return None,
            }
        }
        Some(variant)
    }

    /// Suffix this variant contributes to filenames (`"_nopic"` or `""`)
    pub fn name_suffix(&self) -> &'static str {
        if self.nopic {
            "_nopic"
        } else {
            ""
        }
    }
}

impl std::fmt::Display for DumpVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.nopic, self.nozim) {
            (false, false) => write!(f, "default"),
            (true, false) => write!(f, "nopic"),
            (false, true) => write!(f, "nozim"),
            (true, true) => write!(f, "nopic,nozim"),
        }
    }
}

/// ISO-639-1 to ISO-639-2 mappings for the common wiki languages.
const LANG_CODES: &[(&str, &str)] = &[
    ("ar", "ara"),
    ("bg", "bul"),
    ("bn", "ben"),
    ("ca", "cat"),
    ("cs", "ces"),
    ("da", "dan"),
    ("de", "deu"),
    ("el", "ell"),
    ("en", "eng"),
    ("es", "spa"),
    ("fa", "fas"),
    ("fi", "fin"),
    ("fr", "fra"),
    ("he", "heb"),
    ("hi", "hin"),
    ("hu", "hun"),
    ("id", "ind"),
    ("it", "ita"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("nl", "nld"),
    ("no", "nor"),
    ("pl", "pol"),
    ("pt", "por"),
    ("ro", "ron"),
    ("ru", "rus"),
    ("sr", "srp"),
    ("sv", "swe"),
    ("th", "tha"),
    ("tr", "tur"),
    ("uk", "ukr"),
    ("vi", "vie"),
    ("zh", "zho"),
];

/// Derives the creator name from the wiki host
///
/// The second-level label of the hostname, capitalized:
/// `en.wikipedia.org` becomes `Wikipedia`.
pub fn creator_from_host(host: &str) -> String {
    let labels: Vec<&str> = host.trim_start_matches("www.").split('.').collect();
    let name = if labels.len() >= 2 {
        labels[labels.len() - 2]
    } else {
        host
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Derives the language suffix from the wiki host
///
/// Three-letter first labels are taken as ISO-639-2 codes already;
/// two-letter labels go through the ISO-639-1 table. Anything else (e.g.
/// `simple`) is used verbatim.
pub fn lang_suffix(host: &str) -> String {
    let first = host.split('.').next().unwrap_or(host);
    if first.len() == 2 {
        for (two, three) in LANG_CODES {
            if *two == first {
                return (*three).to_string();
            }
        }
    }
    first.to_string()
}

/// Builds the filename radical
///
/// `{creator}_{lang}[_{selection}][_nopic][_YYYY-MM]`, all lowercased except
/// the creator's leading capital.
pub fn filename_radical(
    creator: &str,
    lang: &str,
    selection: Option<&str>,
    variant: DumpVariant,
    with_date: bool,
) -> String {
    let mut radical = format!("{}_{}", creator, lang);
    if let Some(sel) = selection {
        radical.push('_');
        radical.push_str(sel);
    }
    radical.push_str(variant.name_suffix());
    if with_date {
        let now = Utc::now();
        radical.push_str(&format!("_{:04}-{:02}", now.year(), now.month()));
    }
    radical
}
