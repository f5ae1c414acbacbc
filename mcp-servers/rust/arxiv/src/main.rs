use anyhow::Context;
use mcp_arxiv::ArxivWorker;
use tokio::io::BufReader;
use tracing::info;

// stdout carries protocol lines only; logs go to stderr.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    curator_telemetry::init();
    let worker = ArxivWorker::from_env().context("building arXiv worker")?;
    info!(categories = ?worker.settings().categories, version = env!("CARGO_PKG_VERSION"), "mcp-arxiv ready");
    worker.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
