//! MediaWiki action API client
//!
//! Thin wrapper over [`Fetcher`](super::Fetcher) for the handful of API
//! queries a run needs: siteinfo, title enumeration through the `allpages`
//! generator, revision/coordinate lookups, redirect backlinks, and the
//! two-step login handshake. Responses are the action API's classic JSON
//! format (`format=json`), parsed leniently, since wikis in the wild disagree on
//! plenty of optional fields.

use crate::crawler::fetcher::Fetcher;
use crate::naming::canonical_title;
use crate::{Result, WikimirError};
use chrono::DateTime;
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// General wiki metadata from `meta=siteinfo`
#[derive(Debug, Clone, Default)]
pub struct SiteInfo {
    /// Canonical main page title (spaces, not underscores)
    pub mainpage: Option<String>,
    pub sitename: Option<String>,
    pub lang: Option<String>,
    /// Absolute or protocol-relative URL of the wiki logo
    pub logo: Option<String>,
    /// Whether the content language is written right-to-left
    pub rtl: bool,
    pub namespaces: HashMap<i32, Namespace>,
}

/// One namespace from `siprop=namespaces`
#[derive(Debug, Clone)]
pub struct Namespace {
    pub id: i32,
    pub name: String,
    pub canonical: Option<String>,
    /// Namespaces flagged `content` hold mirrorable articles
    pub content: bool,
}

/// Revision and coordinates for one discovered title
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// Canonical (underscore) title
    pub title: String,
    pub revision_id: Option<u64>,
    /// Revision UNIX timestamp
    pub timestamp: Option<i64>,
    /// `lat;lon` when the article is geotagged
    pub coordinates: Option<String>,
    /// The API reported the title as missing
    pub missing: bool,
}

/// One page of `generator=allpages` output
#[derive(Debug, Clone, Default)]
pub struct PageBatch {
    pub pages: Vec<PageInfo>,
    /// `query-continue` cursor, `None` once enumeration is complete
    pub continue_from: Option<String>,
}

/// One page of `list=backlinks` output
#[derive(Debug, Clone, Default)]
pub struct BacklinkBatch {
    /// Canonical titles of redirects pointing at the queried title
    pub sources: Vec<String>,
    pub continue_from: Option<String>,
}

/// Client for the wiki's action API
pub struct ApiClient {
    api_url: String,
    rest_url: String,
}

impl ApiClient {
    pub fn new(api_url: String, rest_url: String) -> Self {
        Self { api_url, rest_url }
    }

    fn query_url(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&self.api_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    /// URL of the rendered mobile-sections document for a title
    pub fn mobile_sections_url(&self, title: &str) -> String {
        format!(
            "{}/{}",
            self.rest_url,
            crate::naming::encode_for_href(title)
        )
    }

    async fn query(&self, fetcher: &Fetcher, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.query_url(params)?;
        let fetched = fetcher.fetch(&url).await?;
        let value: Value = serde_json::from_slice(&fetched.body)
            .map_err(|e| WikimirError::Api(format!("bad JSON from {}: {}", url, e)))?;
        if let Some(error) = value.get("error") {
            return Err(WikimirError::Api(format!(
                "API error from {}: {}",
                url, error
            )));
        }
        Ok(value)
    }

    /// Fetches general metadata and the namespace table
    pub async fn site_info(&self, fetcher: &Fetcher) -> Result<SiteInfo> {
        let value = self
            .query(
                fetcher,
                &[
                    ("action", "query"),
                    ("meta", "siteinfo"),
                    ("siprop", "general|namespaces"),
                ],
            )
            .await?;

        let general = &value["query"]["general"];
        let mut info = SiteInfo {
            mainpage: general["mainpage"].as_str().map(String::from),
            sitename: general["sitename"].as_str().map(String::from),
            lang: general["lang"].as_str().map(String::from),
            logo: general["logo"].as_str().map(String::from),
            // Classic format marks flags by key presence.
            rtl: general.get("rtl").is_some(),
            namespaces: HashMap::new(),
        };

        if let Some(namespaces) = value["query"]["namespaces"].as_object() {
            for ns in namespaces.values() {
                let Some(id) = ns["id"].as_i64() else { continue };
                let name = ns["*"].as_str().unwrap_or_default().to_string();
                info.namespaces.insert(
                    id as i32,
                    Namespace {
                        id: id as i32,
                        name,
                        canonical: ns["canonical"].as_str().map(String::from),
                        content: ns.get("content").is_some(),
                    },
                );
            }
        }

        Ok(info)
    }

    /// Enumerates non-redirect pages of one namespace
    pub async fn all_pages(
        &self,
        fetcher: &Fetcher,
        namespace: i32,
        continue_from: Option<&str>,
    ) -> Result<PageBatch> {
        let ns = namespace.to_string();
        let mut params = vec![
            ("action", "query"),
            ("generator", "allpages"),
            ("gapfilterredir", "nonredirects"),
            ("gaplimit", "max"),
            ("gapnamespace", ns.as_str()),
            ("prop", "revisions|coordinates"),
            ("rawcontinue", "1"),
        ];
        if let Some(cursor) = continue_from {
            params.push(("gapcontinue", cursor));
        }

        let value = self.query(fetcher, &params).await?;
        Ok(PageBatch {
            pages: parse_pages(&value),
            continue_from: value["query-continue"]["allpages"]["gapcontinue"]
                .as_str()
                .map(String::from),
        })
    }

    /// Resolves revisions and coordinates for explicit titles (file mode)
    pub async fn page_details(&self, fetcher: &Fetcher, titles: &[String]) -> Result<Vec<PageInfo>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        let joined = titles
            .iter()
            .map(|t| t.replace('_', " "))
            .collect::<Vec<_>>()
            .join("|");

        let value = self
            .query(
                fetcher,
                &[
                    ("action", "query"),
                    ("redirects", "1"),
                    ("prop", "revisions|coordinates"),
                    ("titles", joined.as_str()),
                ],
            )
            .await?;

        Ok(parse_pages(&value))
    }

    /// Lists redirect titles pointing at `title`
    pub async fn backlinks(
        &self,
        fetcher: &Fetcher,
        title: &str,
        continue_from: Option<&str>,
    ) -> Result<BacklinkBatch> {
        let display_title = title.replace('_', " ");
        let mut params = vec![
            ("action", "query"),
            ("list", "backlinks"),
            ("blfilterredir", "redirects"),
            ("bllimit", "max"),
            ("bltitle", display_title.as_str()),
            ("rawcontinue", "1"),
        ];
        if let Some(cursor) = continue_from {
            params.push(("blcontinue", cursor));
        }

        let value = self.query(fetcher, &params).await?;

        let sources = value["query"]["backlinks"]
            .as_array()
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| l["title"].as_str())
                    .map(canonical_title)
                    .collect()
            })
            .unwrap_or_default();

        Ok(BacklinkBatch {
            sources,
            continue_from: value["query-continue"]["backlinks"]["blcontinue"]
                .as_str()
                .map(String::from),
        })
    }

    /// Performs the two-step login handshake
    ///
    /// The session cookie lands in the fetcher's cookie store and rides
    /// along on every later request.
    pub async fn login(
        &self,
        fetcher: &Fetcher,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<()> {
        let url = self.query_url(&[("action", "login")])?;

        let mut form = vec![("lgname", username), ("lgpassword", password)];
        if let Some(domain) = domain {
            form.push(("lgdomain", domain));
        }

        let first = fetcher.post_form(&url, &form).await?;
        let first: Value = serde_json::from_slice(&first.body)
            .map_err(|e| WikimirError::Login(format!("bad login response: {}", e)))?;

        let result = first["login"]["result"].as_str().unwrap_or_default();
        if result == "Success" {
            return Ok(());
        }
        if result != "NeedToken" {
            return Err(WikimirError::Login(format!(
                "unexpected login result '{}'",
                result
            )));
        }

        let token = first["login"]["token"]
            .as_str()
            .ok_or_else(|| WikimirError::Login("no token in login response".to_string()))?
            .to_string();

        let mut confirm = vec![
            ("lgname", username),
            ("lgpassword", password),
            ("lgtoken", token.as_str()),
        ];
        if let Some(domain) = domain {
            confirm.push(("lgdomain", domain));
        }

        let second = fetcher.post_form(&url, &confirm).await?;
        let second: Value = serde_json::from_slice(&second.body)
            .map_err(|e| WikimirError::Login(format!("bad login response: {}", e)))?;

        match second["login"]["result"].as_str() {
            Some("Success") => Ok(()),
            other => Err(WikimirError::Login(format!(
                "login rejected: {}",
                other.unwrap_or("no result")
            ))),
        }
    }
}

/// Extracts [`PageInfo`] records from a `query.pages` map
fn parse_pages(value: &Value) -> Vec<PageInfo> {
    let Some(pages) = value["query"]["pages"].as_object() else {
        return Vec::new();
    };

    pages
        .values()
        .filter_map(|page| {
            let title = canonical_title(page["title"].as_str()?);
            let missing = page.get("missing").is_some();

            let revision = page["revisions"].as_array().and_then(|revs| revs.first());
            let revision_id = revision.and_then(|r| r["revid"].as_u64());
            let timestamp = revision
                .and_then(|r| r["timestamp"].as_str())
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|dt| dt.timestamp());

            let coordinates = page["coordinates"]
                .as_array()
                .and_then(|coords| coords.first())
                .and_then(|c| {
                    let lat = c["lat"].as_f64()?;
                    let lon = c["lon"].as_f64()?;
                    Some(format!("{};{}", lat, lon))
                });

            Some(PageInfo {
                title,
                revision_id,
                timestamp,
                coordinates,
                missing,
            })
        })
        .collect()
}
