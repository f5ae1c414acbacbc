//! HTTP GET with bounded retries and exponential backoff.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const USER_AGENT: &str = concat!("paper-curator/", env!("CARGO_PKG_VERSION"), " (mcp-arxiv)");

/// One attempt at fetching a feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpFeedSource {
    http: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building reqwest client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self.http
            .get(url)
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9, text/xml;q=0.8")
            .send().await?;
        let status = resp.status();
        if !status.is_success() { return Err(anyhow!("arXiv API error: HTTP {}", status)); }
        Ok(resp.text().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub const fn new(max_attempts: usize, base_delay: Duration) -> Self { Self { max_attempts, base_delay } }

    /// Category listings.
    pub const fn bulk() -> Self { Self::new(3, Duration::from_secs(2)) }

    /// Single-paper lookups.
    pub const fn single() -> Self { Self::new(2, Duration::from_secs(1)) }

    /// Delay slept after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached.
/// `on_retry` sees every failed attempt that is followed by another one,
/// along with the delay about to be slept. The last error is returned as is.
pub async fn retry_with_backoff<T, F, Fut, L>(policy: BackoffPolicy, mut operation: F, mut on_retry: L) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_for(attempt);
                on_retry(attempt, delay, &err);
                sleep(delay).await;
            }
        }
    }
}

pub struct BackoffFetcher<S> {
    source: S,
}

impl<S: FeedSource> BackoffFetcher<S> {
    pub fn new(source: S) -> Self { Self { source } }

    pub async fn fetch(&self, url: &str, policy: BackoffPolicy) -> Result<String> {
        let source = &self.source;
        let max_attempts = policy.max_attempts.max(1);
        retry_with_backoff(
            policy,
            move |attempt| {
                debug!(attempt, max_attempts, url, "fetching feed");
                source.fetch(url)
            },
            |attempt, delay, err| {
                warn!(attempt, max_attempts, backoff_ms = delay.as_millis() as u64, error = %err, url, "feed fetch failed; retrying");
            },
        )
        .await
        .map_err(|err| {
            warn!(max_attempts, error = %err, url, "feed fetch exhausted retries");
            err.context(format!("fetch failed after {} attempts", max_attempts))
        })
    }
}
