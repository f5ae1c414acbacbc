use super::feed::parse_feed;
use super::fetch::{BackoffFetcher, BackoffPolicy, FeedSource, HttpFeedSource};
use anyhow::{Context, Result};
use curator_types::Paper;
use reqwest::Url;

pub const DEFAULT_FEED_BASE: &str = "https://export.arxiv.org/api";

pub struct ArxivClient<S> {
    fetcher: BackoffFetcher<S>,
    base: String,
}

impl ArxivClient<HttpFeedSource> {
    /// Feed base from `ARXIV_FEED_BASE`, else the public export mirror.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("ARXIV_FEED_BASE").unwrap_or_else(|_| DEFAULT_FEED_BASE.to_string());
        Ok(Self::new(HttpFeedSource::new()?, base))
    }
}

impl<S: FeedSource> ArxivClient<S> {
    pub fn new(source: S, base: impl Into<String>) -> Self {
        Self { fetcher: BackoffFetcher::new(source), base: base.into() }
    }

    fn endpoint(&self) -> String { format!("{}/query", self.base.trim().trim_end_matches('/')) }

    /// Newest `max_results` submissions in `category`.
    pub fn category_query_url(&self, category: &str, max_results: usize) -> Result<Url> {
        let max = max_results.to_string();
        Url::parse_with_params(&self.endpoint(), &[
            ("search_query", format!("cat:{}", category).as_str()),
            ("start", "0"),
            ("max_results", max.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ])
        .with_context(|| format!("invalid feed base {:?}", self.base))
    }

    pub fn id_lookup_url(&self, short_id: &str) -> Result<Url> {
        Url::parse_with_params(&self.endpoint(), &[("id_list", short_id)])
            .with_context(|| format!("invalid feed base {:?}", self.base))
    }

    /// Every returned paper is tagged with `category` in addition to its own terms.
    pub async fn latest_in_category(&self, category: &str, max_results: usize, policy: BackoffPolicy) -> Result<Vec<Paper>> {
        let url = self.category_query_url(category, max_results)?;
        let body = self.fetcher.fetch(url.as_str(), policy).await?;
        let mut papers = parse_feed(&body).with_context(|| format!("parsing feed for {}", category))?;
        for p in papers.iter_mut() {
            p.categories.insert(category.to_string());
        }
        Ok(papers)
    }

    /// `Ok(None)` when the feed answered but had no entry for the id.
    pub async fn lookup(&self, short_id: &str, policy: BackoffPolicy) -> Result<Option<Paper>> {
        let url = self.id_lookup_url(short_id)?;
        let body = self.fetcher.fetch(url.as_str(), policy).await?;
        let papers = parse_feed(&body).with_context(|| format!("parsing entry {}", short_id))?;
        Ok(papers.into_iter().next())
    }
}
