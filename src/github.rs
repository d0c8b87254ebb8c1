//! GitHub REST client and the pagination loop every extractor goes through.
//!
//! The pager is deliberately infallible: rate limits are waited out, other
//! failures are retried on a fixed backoff, and once retries are exhausted
//! whatever records were accumulated are returned as-is. A dead endpoint
//! therefore degrades one entity's harvest instead of aborting the run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::GithubConfig;
use crate::error::EtlError;

const PER_PAGE: u32 = 100;
const MAX_RETRIES: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// GitHub rejects requests without a user agent outright.
const USER_AGENT: &str = concat!("community-etl/", env!("CARGO_PKG_VERSION"));

/// One API response, reduced to what pagination decisions need.
pub struct Page {
    pub status: u16,
    pub ratelimit_remaining: Option<u64>,
    pub ratelimit_reset: Option<i64>,
    /// Decoded JSON body. Only meaningful on a 200.
    pub body: Value,
}

/// Something that can serve result pages. The real implementation is
/// [`GithubClient`]; tests script canned sequences instead.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of `url`. `query` carries endpoint parameters;
    /// `per_page` and `page` are appended by the implementation.
    async fn fetch_page(
        &self,
        url: &str,
        query: &[(String, String)],
        page: u32,
    ) -> Result<Page, EtlError>;
}

/// Pagination tuning. Defaults are the production values; tests shrink the
/// backoff to zero so retry paths run instantly.
#[derive(Debug, Clone)]
pub struct PagerOptions {
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_backoff: RETRY_BACKOFF,
        }
    }
}

/// Fetch every page of `url` and return the concatenated records.
///
/// Terminates on the first empty page. A 403 carrying exhausted rate-limit
/// headers sleeps until the advertised reset and retries the same page
/// without consuming a retry. Any other failure (non-200 status, transport
/// error, non-array body) burns one of `max_retries` attempts; exhausting
/// them returns the records gathered so far.
pub async fn paginate<S: PageSource>(
    source: &S,
    url: &str,
    query: &[(String, String)],
    opts: &PagerOptions,
) -> Vec<Value> {
    let mut records = Vec::new();
    let mut page: u32 = 1;
    let mut retries: u32 = 0;

    loop {
        let outcome = source.fetch_page(url, query, page).await;
        match outcome {
            Ok(p) if p.status == 200 => match p.body.as_array() {
                Some(items) if items.is_empty() => return records,
                Some(items) => {
                    records.extend(items.iter().cloned());
                    page += 1;
                }
                None => {
                    retries += 1;
                    if retries > opts.max_retries {
                        warn!(
                            "giving up on {url} after {} retries (non-array body), keeping {} records",
                            opts.max_retries,
                            records.len()
                        );
                        return records;
                    }
                    warn!("non-array body from {url} page {page}, retry {retries}/{}", opts.max_retries);
                    tokio::time::sleep(opts.retry_backoff).await;
                }
            },
            Ok(p) if is_rate_limited(&p) => {
                let wait = ratelimit_wait(p.ratelimit_reset.unwrap_or(0), Utc::now().timestamp());
                info!(
                    "rate limited on {url} page {page}, sleeping {}s until reset",
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
            }
            Ok(p) => {
                retries += 1;
                if retries > opts.max_retries {
                    warn!(
                        "giving up on {url} after {} retries (last status {}), keeping {} records",
                        opts.max_retries,
                        p.status,
                        records.len()
                    );
                    return records;
                }
                warn!(
                    "status {} from {url} page {page}, retry {retries}/{}",
                    p.status, opts.max_retries
                );
                tokio::time::sleep(opts.retry_backoff).await;
            }
            Err(e) => {
                retries += 1;
                if retries > opts.max_retries {
                    warn!(
                        "giving up on {url} after {} retries ({e}), keeping {} records",
                        opts.max_retries,
                        records.len()
                    );
                    return records;
                }
                warn!("request error on {url} page {page}: {e}, retry {retries}/{}", opts.max_retries);
                tokio::time::sleep(opts.retry_backoff).await;
            }
        }
    }
}

/// A 403 whose rate-limit allowance reads zero and that names a reset time.
/// Anything else that comes back 403 goes down the ordinary retry path.
fn is_rate_limited(p: &Page) -> bool {
    p.status == 403 && p.ratelimit_remaining == Some(0) && p.ratelimit_reset.is_some()
}

/// Sleep length until the rate-limit window resets, floored at one second
/// so clock skew never produces a zero or negative wait.
fn ratelimit_wait(reset_epoch: i64, now_epoch: i64) -> Duration {
    Duration::from_secs((reset_epoch - now_epoch).max(1) as u64)
}

/// Minimal GitHub REST client: token auth, mandatory user agent, paginated
/// GETs returning raw JSON records.
pub struct GithubClient {
    http: reqwest::Client,
    token: Option<String>,
    api_url: String,
}

impl GithubClient {
    pub fn new(cfg: &GithubConfig) -> Result<Self, EtlError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            token: cfg.token.clone(),
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for an API path such as `/users/foo/repos`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// All records behind `url`, across every page.
    pub async fn get_paged(&self, url: &str, query: &[(String, String)]) -> Vec<Value> {
        paginate(self, url, query, &PagerOptions::default()).await
    }
}

#[async_trait]
impl PageSource for GithubClient {
    async fn fetch_page(
        &self,
        url: &str,
        query: &[(String, String)],
        page: u32,
    ) -> Result<Page, EtlError> {
        let mut req = self
            .http
            .get(url)
            .query(query)
            .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("token {token}"));
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let ratelimit_remaining = header_num::<u64>(resp.headers(), "x-ratelimit-remaining");
        let ratelimit_reset = header_num::<i64>(resp.headers(), "x-ratelimit-reset");
        let body = if status == 200 {
            resp.json::<Value>().await?
        } else {
            Value::Null
        };

        Ok(Page {
            status,
            ratelimit_remaining,
            ratelimit_reset,
            body,
        })
    }
}

fn header_num<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<T>().ok())
}
