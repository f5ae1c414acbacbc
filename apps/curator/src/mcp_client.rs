//! Line-delimited JSON-RPC channel to the arXiv worker process.
//!
//! Requests carry a strictly increasing id. Each outstanding request sits in
//! a bounded [`PendingTable`] until the matching response line arrives or its
//! deadline passes; a response for an id that is no longer pending is dropped.

use crate::research::pipeline::PaperWorker;
use anyhow::{bail, Context};
use async_trait::async_trait;
use curator_mcp::tools::{AbstractsArgs, AbstractsResult, TitlesArgs, TitlesResult};
use curator_mcp::{RequestEnvelope, ResponseEnvelope, RpcError, ToolCallParams, ToolCallResult};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_PENDING: usize = 256;
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("request {id} ({method}) timed out after {timeout:?}")]
    Timeout { id: u64, method: String, timeout: Duration },
    #[error("worker rejected request {id}: {message}")]
    Remote { id: u64, code: i64, message: String },
    #[error("worker channel closed before request {0} was answered")]
    Closed(u64),
    #[error("too many pending requests (limit {0})")]
    Saturated(usize),
    #[error("worker channel I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding request: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub request_timeout: Duration,
    pub max_pending: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self { Self { request_timeout: DEFAULT_REQUEST_TIMEOUT, max_pending: DEFAULT_MAX_PENDING } }
}

/// Bytes read from the worker that do not yet form a complete line stay here
/// until the next read completes them.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    /// Set after an oversized fragment was dropped; the rest of that line is skipped.
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self { Self::with_limit(MAX_LINE_BYTES) }
}

impl LineBuffer {
    pub fn with_limit(max_line: usize) -> Self {
        Self { buf: Vec::new(), scanned: 0, max_line: max_line.max(1), discarding: false }
    }

    /// Appends `chunk` and drains every complete line. Blank lines are skipped
    /// and a trailing `\r` is removed. A line longer than the limit is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = vec![];
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(off) = self.buf[from..].iter().position(|b| *b == b'\n') {
            let end = from + off;
            if self.discarding {
                self.discarding = false;
            } else {
                let text = String::from_utf8_lossy(&self.buf[start..end]);
                let text = text.trim_end_matches('\r');
                if !text.trim().is_empty() { lines.push(text.to_string()); }
            }
            start = end + 1;
            from = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        if self.buf.len() > self.max_line {
            warn!(bytes = self.buf.len(), limit = self.max_line, "dropping oversized line from worker");
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        lines
    }

    pub fn fragment(&self) -> &[u8] { &self.buf }
}

pub struct PendingRequest {
    pub method: String,
    pub deadline: Instant,
    resolution: oneshot::Sender<Result<JsonValue, RpcError>>,
}

pub struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
    capacity: usize,
}

impl PendingTable {
    pub fn new(capacity: usize) -> Self { Self { entries: HashMap::new(), capacity: capacity.max(1) } }

    /// Expired entries are evicted first when the table is full.
    pub fn insert(&mut self, id: u64, req: PendingRequest, now: Instant) -> Result<(), ChannelError> {
        if self.entries.len() >= self.capacity { self.evict_expired(now); }
        if self.entries.len() >= self.capacity { return Err(ChannelError::Saturated(self.capacity)); }
        self.entries.insert(id, req);
        Ok(())
    }

    /// Hands `outcome` to the waiter for `id`. Returns false when nothing was
    /// pending under that id.
    pub fn resolve(&mut self, id: u64, outcome: Result<JsonValue, RpcError>) -> bool {
        match self.entries.remove(&id) {
            Some(p) => {
                // The waiter may have given up between its deadline and now.
                let _ = p.resolution.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<PendingRequest> { self.entries.remove(&id) }

    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, p| p.deadline > now);
        before - self.entries.len()
    }

    pub fn contains(&self, id: u64) -> bool { self.entries.contains_key(&id) }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

pub struct McpChannel {
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    options: ChannelOptions,
    reader: JoinHandle<()>,
}

impl McpChannel {
    /// Must be called inside a tokio runtime: the reader loop is spawned here.
    pub fn connect<R, W>(reader: R, writer: W, options: ChannelOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(PendingTable::new(options.max_pending)));
        let reader = tokio::spawn(read_loop(reader, pending.clone()));
        Self { writer: AsyncMutex::new(Box::new(writer)), pending, next_id: AtomicU64::new(1), options, reader }
    }

    pub async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue, ChannelError> {
        let res = self.request_inner(method, params).await;
        let outcome = match &res {
            Ok(_) => "ok",
            Err(ChannelError::Timeout { .. }) => "timeout",
            Err(ChannelError::Remote { .. }) => "remote_error",
            Err(_) => "error",
        };
        curator_telemetry::inc_channel_request(method, outcome);
        res
    }

    async fn request_inner(&self, method: &str, params: JsonValue) -> Result<JsonValue, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&RequestEnvelope::new(id, method, params))? + "\n";
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let deadline = now + self.options.request_timeout;
        self.pending.lock().insert(id, PendingRequest { method: method.to_string(), deadline, resolution: tx }, now)?;

        let written = {
            let mut w = self.writer.lock().await;
            match w.write_all(line.as_bytes()).await {
                Ok(()) => w.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().remove(id);
            return Err(ChannelError::Io(e));
        }
        trace!(id, method, "request sent");

        match timeout_at(deadline, rx).await {
            Ok(Ok(Ok(v))) => Ok(v),
            Ok(Ok(Err(e))) => Err(ChannelError::Remote { id, code: e.code, message: e.message }),
            Ok(Err(_)) => Err(ChannelError::Closed(id)),
            Err(_) => {
                self.pending.lock().remove(id);
                warn!(id, method, timeout_ms = self.options.request_timeout.as_millis() as u64, "worker request timed out");
                Err(ChannelError::Timeout { id, method: method.to_string(), timeout: self.options.request_timeout })
            }
        }
    }

    pub fn pending_len(&self) -> usize { self.pending.lock().len() }
}

impl Drop for McpChannel {
    fn drop(&mut self) { self.reader.abort(); }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, pending: Arc<Mutex<PendingTable>>) {
    let mut lines = LineBuffer::default();
    let mut chunk = vec![0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => { warn!(pending = pending.lock().len(), "worker closed its output"); break; }
            Ok(n) => n,
            Err(e) => { warn!(error = %e, "reading from worker failed"); break; }
        };
        for line in lines.push(&chunk[..n]) {
            let resp: ResponseEnvelope = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(_) => { trace!(line = %line, "discarding non-protocol line"); continue; }
            };
            let Some(id) = resp.id else {
                trace!(line = %line, "discarding message without id");
                continue;
            };
            if !pending.lock().resolve(id, resp.into_outcome()) {
                debug!(id, "response for unknown or expired request ignored");
            }
        }
    }
}

/// Handshaked client for the worker's two tools.
pub struct WorkerClient {
    channel: McpChannel,
    child: Option<Child>,
    initialized: AtomicBool,
}

impl WorkerClient {
    pub fn new(channel: McpChannel) -> Self { Self { channel, child: None, initialized: AtomicBool::new(false) } }

    /// Starts `bin` with piped stdio; stderr is inherited so worker logs stay visible.
    /// Commands with spaces (e.g. `cargo run -p mcp-arxiv`) run through `sh -lc`.
    pub fn spawn(bin: &str, envs: &[(String, String)], options: ChannelOptions) -> anyhow::Result<Self> {
        let mut cmd = if bin.contains(' ') {
            let mut c = Command::new("sh");
            c.arg("-lc").arg(bin);
            c
        } else {
            Command::new(bin)
        };
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit()).kill_on_drop(true);
        for (k, v) in envs { cmd.env(k, v); }
        let mut child = cmd.spawn().with_context(|| format!("spawning worker {:?}", bin))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow::anyhow!("no stdin for worker"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("no stdout for worker"))?;
        info!(bin, pid = child.id(), "worker started");
        let mut client = Self::new(McpChannel::connect(stdout, stdin, options));
        client.child = Some(child);
        Ok(client)
    }

    pub async fn initialize(&self) -> anyhow::Result<JsonValue> {
        let result = self.channel.request(curator_mcp::METHOD_INITIALIZE, json!({
            "protocolVersion": curator_mcp::PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "curator", "version": env!("CARGO_PKG_VERSION")}
        })).await?;
        self.initialized.store(true, Ordering::SeqCst);
        debug!(server = %result.get("serverInfo").cloned().unwrap_or_default(), "worker handshake complete");
        Ok(result)
    }

    pub async fn call_tool<T: serde::de::DeserializeOwned>(&self, name: &str, arguments: JsonValue) -> anyhow::Result<T> {
        if !self.initialized.load(Ordering::SeqCst) { bail!("worker not initialized"); }
        let params = serde_json::to_value(ToolCallParams { name: name.to_string(), arguments })?;
        let raw = self.channel.request(curator_mcp::METHOD_TOOLS_CALL, params).await?;
        let result: ToolCallResult = serde_json::from_value(raw).with_context(|| format!("malformed {} reply", name))?;
        result.decode().with_context(|| format!("decoding {} result", name))
    }

    pub fn channel(&self) -> &McpChannel { &self.channel }

    /// Kills and reaps the worker process, if this client started one.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to stop worker");
            } else {
                info!("worker stopped");
            }
        }
    }
}

#[async_trait]
impl PaperWorker for WorkerClient {
    async fn get_all_titles(&self, papers_per_category: usize) -> anyhow::Result<TitlesResult> {
        let args = serde_json::to_value(TitlesArgs { papers_per_category })?;
        self.call_tool(curator_mcp::TOOL_GET_ALL_TITLES, args).await
    }

    async fn get_abstracts_for_papers(&self, paper_urls: &[String]) -> anyhow::Result<AbstractsResult> {
        let args = serde_json::to_value(AbstractsArgs { paper_urls: paper_urls.to_vec() })?;
        self.call_tool(curator_mcp::TOOL_GET_ABSTRACTS, args).await
    }
}
