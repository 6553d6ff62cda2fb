//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for a run, including:
//! - Building the HTTP client with the operator-identifying user agent
//! - Retry logic with attempt-scaled timeouts
//! - Transparent gzip/deflate decoding and redirect following
//! - Scheme coercion for protocol-relative URLs
//!
//! Concurrency is bounded by the calling work pool, not here; the client
//! keeps connections pooled and alive across requests.

use crate::config::Config;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Number of attempts before a fetch is given up on.
const MAX_ATTEMPTS: u64 = 3;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u64 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// A fetched response: decoded body plus its headers
#[derive(Debug, Clone, Default)]
pub struct FetchedBody {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl FetchedBody {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// HTTP fetcher shared by every queue of a run
pub struct Fetcher {
    client: Client,
    base_url: Url,
    base_timeout: Duration,
}

impl Fetcher {
    /// Builds the fetcher from the run configuration
    ///
    /// The user agent is `wikimir/<version> (<admin email>)`; the cookie
    /// store keeps the login session cookie attached to every request.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.wiki.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", config.wiki.url, e)))?;

        let user_agent = format!(
            "wikimir/{} ({})",
            env!("CARGO_PKG_VERSION"),
            config.contact.admin_email
        );

        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            base_timeout: Duration::from_secs(config.crawl.request_timeout),
        })
    }

    /// The wiki this fetcher is anchored to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a possibly scheme-less or relative URL against the wiki
    ///
    /// Protocol-relative (`//host/...`) and bare URLs take the scheme the
    /// wiki itself is served over (port 443 means https, anything else
    /// http); path-relative URLs resolve against the wiki base.
    pub fn absolutize(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }

        let scheme = if self.base_url.port_or_known_default() == Some(443) {
            "https"
        } else {
            "http"
        };

        if let Some(rest) = url.strip_prefix("//") {
            return format!("{}://{}", scheme, rest);
        }

        match self.base_url.join(url) {
            Ok(joined) => joined.to_string(),
            Err(_) => format!("{}://{}", scheme, url),
        }
    }

    /// Fetches a URL with retry
    ///
    /// Each attempt gets `request-timeout × attempt` to finish. Socket-level
    /// failures back off `10 × attempt` seconds; request errors and non-2xx
    /// statuses retry immediately. After the last attempt the error is
    /// returned; policy for continuing with an empty body lives with the
    /// caller, see [`Fetcher::fetch_or_empty`].
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let url = self.absolutize(url);

        for attempt in 1..=MAX_ATTEMPTS {
            let timeout = self.base_timeout * attempt as u32;
            let result = self.client.get(&url).timeout(timeout).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let headers = header_map(&response);
                        let body = response.bytes().await?;
                        return Ok(FetchedBody {
                            body: body.to_vec(),
                            headers,
                        });
                    }

                    tracing::warn!(
                        "attempt {}/{} for {} returned {}",
                        attempt,
                        MAX_ATTEMPTS,
                        url,
                        status
                    );
                    if attempt == MAX_ATTEMPTS {
                        return Err(FetchError::Status {
                            url,
                            status: status.as_u16(),
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        tokio::time::sleep(Duration::from_secs(10 * attempt)).await;
                    }
                }
                Err(e) => {
                    let socket_level = e.is_timeout() || e.is_connect();
                    tracing::warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt,
                        MAX_ATTEMPTS,
                        url,
                        e
                    );
                    if attempt == MAX_ATTEMPTS {
                        return Err(FetchError::RetriesExhausted {
                            url,
                            attempts: MAX_ATTEMPTS,
                        });
                    }
                    if socket_level {
                        tokio::time::sleep(Duration::from_secs(10 * attempt)).await;
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url,
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Fetches a URL, degrading to an empty body on persistent failure
    ///
    /// This is the contract most of the crawl runs under: a download that
    /// keeps failing is logged and skipped, the run continues.
    pub async fn fetch_or_empty(&self, url: &str) -> FetchedBody {
        match self.fetch(url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!("{}", e);
                FetchedBody::default()
            }
        }
    }

    /// POSTs a form (used by the login handshake)
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<FetchedBody, FetchError> {
        let response = self
            .client
            .post(url)
            .form(form)
            .timeout(self.base_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = header_map(&response);
        let body = response.bytes().await?;
        Ok(FetchedBody {
            body: body.to_vec(),
            headers,
        })
    }
}

fn header_map(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_lowercase(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
