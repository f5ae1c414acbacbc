use anyhow::Result;
use curator_mcp::tools::{AbstractsArgs, AbstractsResult, TitlesArgs, TitlesResult, MAX_ABSTRACT_BATCH, MAX_PAPERS_PER_CATEGORY};
use curator_mcp::{RequestEnvelope, ResponseEnvelope, ToolCallParams, ToolCallResult};
use curator_types::Paper;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub mod arxiv;

use arxiv::client::ArxivClient;
use arxiv::fetch::{BackoffPolicy, FeedSource, HttpFeedSource};

pub const DEFAULT_CATEGORIES: &[&str] = &["cs.AI", "cs.LG", "cs.CL", "cs.IR", "stat.ML"];

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Queried in this order.
    pub categories: Vec<String>,
    pub category_pause: Duration,
    pub lookup_pause: Duration,
    pub bulk: BackoffPolicy,
    pub single: BackoffPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            category_pause: Duration::from_secs(2),
            lookup_pause: Duration::from_secs(1),
            bulk: BackoffPolicy::bulk(),
            single: BackoffPolicy::single(),
        }
    }
}

impl WorkerSettings {
    /// Categories may be overridden with `CURATOR_CATEGORIES=cs.AI,cs.LG`.
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Ok(raw) = std::env::var("CURATOR_CATEGORIES") {
            let cats: Vec<String> = raw.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect();
            if !cats.is_empty() { s.categories = cats; }
        }
        s
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(serde_json::Error),
    #[error("encoding tool result: {0}")]
    Encode(serde_json::Error),
}

pub struct ArxivWorker<S> {
    client: ArxivClient<S>,
    settings: WorkerSettings,
}

impl ArxivWorker<HttpFeedSource> {
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ArxivClient::from_env()?, WorkerSettings::from_env()))
    }
}

impl<S: FeedSource> ArxivWorker<S> {
    pub fn new(client: ArxivClient<S>, settings: WorkerSettings) -> Self { Self { client, settings } }

    pub fn settings(&self) -> &WorkerSettings { &self.settings }

    /// A category that fails to fetch or parse is skipped with a count of 0.
    pub async fn get_all_titles(&self, papers_per_category: usize) -> TitlesResult {
        let n = papers_per_category.clamp(1, MAX_PAPERS_PER_CATEGORY);
        let mut by_category = std::collections::BTreeMap::new();
        let mut all: Vec<Paper> = vec![];
        for (ix, category) in self.settings.categories.iter().enumerate() {
            if ix > 0 { tokio::time::sleep(self.settings.category_pause).await; }
            match self.client.latest_in_category(category, n, self.settings.bulk).await {
                Ok(papers) => {
                    info!(category = %category, count = papers.len(), "fetched category");
                    by_category.insert(category.clone(), papers.len());
                    all.extend(papers);
                }
                Err(e) => {
                    warn!(category = %category, error = %format!("{:#}", e), "skipping category");
                    by_category.insert(category.clone(), 0);
                }
            }
        }
        let mut papers = dedup_by_id(all);
        sort_newest_first(&mut papers);
        TitlesResult { total: papers.len(), by_category, papers }
    }

    /// Only papers whose lookup succeeded are returned; the batch is capped at 20.
    pub async fn get_abstracts_for_papers(&self, paper_urls: &[String]) -> AbstractsResult {
        let batch = &paper_urls[..paper_urls.len().min(MAX_ABSTRACT_BATCH)];
        if batch.len() < paper_urls.len() {
            warn!(requested = paper_urls.len(), kept = batch.len(), "abstract batch truncated");
        }
        let mut papers: Vec<Paper> = vec![];
        for (ix, url) in batch.iter().enumerate() {
            if ix > 0 { tokio::time::sleep(self.settings.lookup_pause).await; }
            let short = curator_types::short_id(url);
            match self.client.lookup(&short, self.settings.single).await {
                Ok(Some(mut paper)) => {
                    if paper.abstract_text.is_none() {
                        warn!(id = %short, "entry has no abstract; skipping");
                        continue;
                    }
                    // Keep the caller's identifier so results line up with the candidate list.
                    paper.id = url.clone();
                    debug!(id = %short, "abstract fetched");
                    papers.push(paper);
                }
                Ok(None) => warn!(id = %short, "no feed entry for paper; skipping"),
                Err(e) => warn!(id = %short, error = %format!("{:#}", e), "abstract fetch failed; skipping"),
            }
        }
        AbstractsResult { requested: batch.len(), fetched: papers.len(), papers }
    }

    pub async fn call_tool(&self, params: ToolCallParams) -> Result<ToolCallResult, ToolError> {
        let result = match params.name.as_str() {
            curator_mcp::TOOL_GET_ALL_TITLES => {
                let args: TitlesArgs = serde_json::from_value(non_null(params.arguments)).map_err(ToolError::InvalidArguments)?;
                ToolCallResult::json(&self.get_all_titles(args.papers_per_category).await).map_err(ToolError::Encode)?
            }
            curator_mcp::TOOL_GET_ABSTRACTS => {
                let args: AbstractsArgs = serde_json::from_value(params.arguments).map_err(ToolError::InvalidArguments)?;
                ToolCallResult::json(&self.get_abstracts_for_papers(&args.paper_urls).await).map_err(ToolError::Encode)?
            }
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(result)
    }

    /// Notifications (no id) get no reply.
    pub async fn handle(&self, req: RequestEnvelope) -> Option<ResponseEnvelope> {
        let id = req.id?;
        let resp = match req.method.as_str() {
            curator_mcp::METHOD_INITIALIZE => ResponseEnvelope::ok(Some(id), json!({
                "protocolVersion": curator_mcp::PROTOCOL_VERSION,
                "serverInfo": {"name": "mcp-arxiv", "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {"tools": {}}
            })),
            curator_mcp::METHOD_TOOLS_LIST => ResponseEnvelope::ok(Some(id), json!({"tools": curator_mcp::tools::tool_descriptors()})),
            curator_mcp::METHOD_TOOLS_CALL => match serde_json::from_value::<ToolCallParams>(req.params) {
                Ok(params) => {
                    let name = params.name.clone();
                    match self.call_tool(params).await {
                        Ok(res) => match serde_json::to_value(&res) {
                            Ok(v) => ResponseEnvelope::ok(Some(id), v),
                            Err(e) => ResponseEnvelope::err(Some(id), curator_mcp::CODE_TOOL_FAILED, e.to_string()),
                        },
                        Err(e) => {
                            warn!(tool = %name, error = %e, "tool call rejected");
                            let code = match e {
                                ToolError::UnknownTool(_) => curator_mcp::CODE_METHOD_NOT_FOUND,
                                ToolError::InvalidArguments(_) => curator_mcp::CODE_INVALID_PARAMS,
                                ToolError::Encode(_) => curator_mcp::CODE_TOOL_FAILED,
                            };
                            ResponseEnvelope::err(Some(id), code, e.to_string())
                        }
                    }
                }
                Err(e) => ResponseEnvelope::err(Some(id), curator_mcp::CODE_INVALID_PARAMS, format!("bad tools/call params: {}", e)),
            },
            other => ResponseEnvelope::err(Some(id), curator_mcp::CODE_METHOD_NOT_FOUND, format!("method not found: {}", other)),
        };
        Some(resp)
    }

    /// Serves requests line by line until the reader hits EOF. Lines that are
    /// not UTF-8 JSON-RPC requests are ignored.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 { break; }
            let line = match std::str::from_utf8(&buf) {
                Ok(l) => l,
                Err(e) => { debug!(error = %e, "ignoring undecodable line"); continue; }
            };
            if line.trim().is_empty() { continue; }
            let req: RequestEnvelope = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => { debug!(error = %e, "ignoring non-request line"); continue; }
            };
            if let Some(resp) = self.handle(req).await {
                let out = serde_json::to_string(&resp)? + "\n";
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!("stdin closed; worker exiting");
        Ok(())
    }
}

fn non_null(v: JsonValue) -> JsonValue { if v.is_null() { json!({}) } else { v } }

/// First occurrence wins; later duplicates only contribute their categories.
pub fn dedup_by_id(papers: Vec<Paper>) -> Vec<Paper> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Paper> = vec![];
    for p in papers {
        match index.get(&p.id) {
            Some(&ix) => out[ix].merge_categories(&p),
            None => {
                index.insert(p.id.clone(), out.len());
                out.push(p);
            }
        }
    }
    out
}

/// Stable; undated papers sink to the end.
pub fn sort_newest_first(papers: &mut [Paper]) {
    papers.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
