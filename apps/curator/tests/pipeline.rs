use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use curator::mcp_client::{ChannelError, ChannelOptions, McpChannel, WorkerClient};
use curator::research::pipeline::{run_pipeline, PaperWorker};
use curator::research::scorer::{RelevanceScorer, TextOracle, SCORING_FALLBACK};
use curator::research::types::{CurationReport, PipelineParams};
use curator_mcp::tools::{AbstractsResult, TitlesResult};
use curator_types::Paper;
use mcp_arxiv::arxiv::client::ArxivClient;
use mcp_arxiv::arxiv::fetch::{BackoffPolicy, FeedSource};
use mcp_arxiv::{ArxivWorker, WorkerSettings};
use pretty_assertions::assert_eq;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{duplex, split, BufReader};

fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap() }

fn paper(id: &str, title: &str, days_old: i64) -> Paper {
    let mut p = Paper::new(format!("http://arxiv.org/abs/{}", id), title);
    p.authors = vec!["J. Doe".into()];
    p.published_at = Some(now() - ChronoDuration::days(days_old));
    p
}

fn params(keywords: &[&str]) -> PipelineParams {
    PipelineParams {
        papers_per_category: 20,
        days_back: 3,
        max_candidates: 15,
        min_score: 6,
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        score_pause: Duration::from_secs(1),
    }
}

/// Serves a fixed title list and abstracts for ids in `abstracts`.
struct ScriptedWorker {
    titles: Vec<Paper>,
    abstracts: HashMap<String, String>,
    abstract_calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    fn new(titles: Vec<Paper>, abstracts: &[(&str, &str)]) -> Self {
        Self {
            titles,
            abstracts: abstracts.iter().map(|(id, a)| (format!("http://arxiv.org/abs/{}", id), a.to_string())).collect(),
            abstract_calls: AtomicUsize::new(0),
            requested: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl PaperWorker for ScriptedWorker {
    async fn get_all_titles(&self, _papers_per_category: usize) -> Result<TitlesResult> {
        Ok(TitlesResult { total: self.titles.len(), by_category: Default::default(), papers: self.titles.clone() })
    }

    async fn get_abstracts_for_papers(&self, paper_urls: &[String]) -> Result<AbstractsResult> {
        self.abstract_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().extend(paper_urls.iter().cloned());
        let papers: Vec<Paper> = paper_urls
            .iter()
            .filter_map(|url| {
                let text = self.abstracts.get(url)?;
                let mut p = Paper::new(url.clone(), "ignored");
                p.abstract_text = Some(text.clone());
                Some(p)
            })
            .collect();
        Ok(AbstractsResult { requested: paper_urls.len(), fetched: papers.len(), papers })
    }
}

/// Answers by looking for a known title in the prompt; unknown titles fail.
struct TitleOracle {
    answers: Vec<(&'static str, &'static str)>,
    calls: AtomicUsize,
}

#[async_trait]
impl TextOracle for TitleOracle {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .iter()
            .find(|(title, _)| prompt.contains(title))
            .map(|(_, answer)| answer.to_string())
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }
}

#[tokio::test]
async fn no_keyword_match_short_circuits() {
    let worker = ScriptedWorker::new(vec![paper("2501.00001v1", "Protein folding at scale", 1)], &[]);
    let oracle = TitleOracle { answers: vec![], calls: AtomicUsize::new(0) };
    let scorer = RelevanceScorer::new(oracle, "profile");

    let report = run_pipeline(&worker, &scorer, &params(&["rlhf"]), now()).await;

    assert_eq!(report.total_scanned, 1);
    assert_eq!(report.recent, 1);
    assert_eq!(report.candidates, 0);
    assert!(report.analyzed.is_empty());
    assert!(report.relevant.is_empty());
    assert_eq!(worker.abstract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn full_funnel_scores_and_ranks() {
    let titles = vec![
        paper("2501.00001v1", "RLHF without rewards", 0),
        paper("2501.00002v1", "Old LLM survey", 10),
        paper("2501.00003v1", "Agents that plan", 1),
        paper("2501.00004v1", "LLM judges disagree", 2),
        paper("2501.00005v1", "Graph coloring bounds", 1),
        paper("2501.00006v1", "Agent memory without abstract", 1),
    ];
    let worker = ScriptedWorker::new(titles, &[
        ("2501.00001v1", "Preference learning from comparisons."),
        ("2501.00003v1", "Planning with tool calls."),
        ("2501.00004v1", "Judges vary a lot."),
    ]);
    let oracle = TitleOracle {
        answers: vec![
            ("RLHF without rewards", "Score: 6/10 - Relevant to alignment work."),
            ("Agents that plan", "Score: 9/10 - Directly on agents."),
        ],
        calls: AtomicUsize::new(0),
    };
    let scorer = RelevanceScorer::new(oracle, "profile");
    let started = tokio::time::Instant::now();

    let report = run_pipeline(&worker, &scorer, &params(&["rlhf", "llm", "agent"]), now()).await;

    assert_eq!(report.total_scanned, 6);
    assert_eq!(report.recent, 5);
    assert_eq!(report.candidates, 4);
    let requested = worker.requested.lock().unwrap().clone();
    assert_eq!(requested.len(), 4);

    let analyzed: Vec<(&str, Option<u8>)> = report.analyzed.iter().map(|p| (p.title.as_str(), p.score)).collect();
    assert_eq!(analyzed, vec![
        ("RLHF without rewards", Some(6)),
        ("Agents that plan", Some(9)),
        ("LLM judges disagree", Some(0)),
    ]);
    assert_eq!(report.analyzed[2].reasoning.as_deref(), Some(SCORING_FALLBACK));
    assert_eq!(report.analyzed[1].abstract_text.as_deref(), Some("Planning with tool calls."));

    let relevant: Vec<&str> = report.relevant.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(relevant, vec!["Agents that plan", "RLHF without rewards"]);
    // Three scoring calls, two pauses.
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

/// Serves titles from the inner worker but fails the chosen round trip the
/// way a stalled worker does.
struct StalledWorker {
    inner: ScriptedWorker,
    titles_fail: bool,
}

fn stalled(id: u64) -> anyhow::Error {
    ChannelError::Timeout { id, method: "tools/call".into(), timeout: Duration::from_secs(60) }.into()
}

#[async_trait]
impl PaperWorker for StalledWorker {
    async fn get_all_titles(&self, n: usize) -> Result<TitlesResult> {
        if self.titles_fail { return Err(stalled(1)); }
        self.inner.get_all_titles(n).await
    }

    async fn get_abstracts_for_papers(&self, _paper_urls: &[String]) -> Result<AbstractsResult> {
        self.inner.abstract_calls.fetch_add(1, Ordering::SeqCst);
        Err(stalled(2))
    }
}

#[tokio::test]
async fn abstract_timeout_keeps_counts_and_skips_scoring() {
    let inner = ScriptedWorker::new(vec![paper("2501.00001v1", "RLHF in practice", 1), paper("2501.00002v1", "Knot theory", 1)], &[]);
    let worker = StalledWorker { inner, titles_fail: false };
    let scorer = RelevanceScorer::new(TitleOracle { answers: vec![], calls: AtomicUsize::new(0) }, "profile");

    let report = run_pipeline(&worker, &scorer, &params(&["rlhf"]), now()).await;

    assert_eq!(report.total_scanned, 2);
    assert_eq!(report.recent, 2);
    assert_eq!(report.candidates, 1);
    assert!(report.analyzed.is_empty());
    assert!(report.relevant.is_empty());
    assert_eq!(worker.inner.abstract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(scorer.oracle().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn title_failure_yields_empty_report() {
    let inner = ScriptedWorker::new(vec![paper("2501.00001v1", "RLHF in practice", 1)], &[]);
    let worker = StalledWorker { inner, titles_fail: true };
    let scorer = RelevanceScorer::new(TitleOracle { answers: vec![], calls: AtomicUsize::new(0) }, "profile");

    let report = run_pipeline(&worker, &scorer, &params(&["rlhf"]), now()).await;

    assert_eq!(report, CurationReport::default());
    assert_eq!(worker.inner.abstract_calls.load(Ordering::SeqCst), 0);
}

#[derive(Default)]
struct CannedFeed {
    bodies: HashMap<String, String>,
}

#[async_trait]
impl FeedSource for CannedFeed {
    async fn fetch(&self, url: &str) -> Result<String> {
        let url = Url::parse(url)?;
        let key = url
            .query_pairs()
            .find(|(k, _)| k == "search_query" || k == "id_list")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        self.bodies.get(&key).cloned().ok_or_else(|| anyhow::anyhow!("HTTP 404 for {}", key))
    }
}

fn atom(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, title, summary)| format!(
            "<entry><id>http://arxiv.org/abs/{id}</id><published>2025-01-09T08:00:00Z</published><title>{title}</title><summary>{summary}</summary><author><name>J. Doe</name></author><category term=\"cs.CL\"/></entry>"
        ))
        .collect();
    format!(r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">{}</feed>"#, body)
}

#[tokio::test(start_paused = true)]
async fn pipeline_runs_against_worker_over_channel() {
    let mut feed = CannedFeed::default();
    feed.bodies.insert("cat:cs.CL".into(), atom(&[
        ("2501.00011v1", "Retrieval for long documents", "Long context retrieval."),
        ("2501.00012v1", "Phonology of tone", "Tone systems."),
    ]));
    feed.bodies.insert("2501.00011v1".into(), atom(&[("2501.00011v1", "Retrieval for long documents", "Long context retrieval.")]));
    let settings = WorkerSettings {
        categories: vec!["cs.CL".into()],
        category_pause: Duration::from_secs(2),
        lookup_pause: Duration::from_secs(1),
        bulk: BackoffPolicy::new(1, Duration::ZERO),
        single: BackoffPolicy::new(1, Duration::ZERO),
    };
    let arxiv = ArxivWorker::new(ArxivClient::new(feed, "http://feed.test/api"), settings);

    let (client, server) = duplex(256 * 1024);
    let (server_read, server_write) = split(server);
    tokio::spawn(async move { arxiv.serve(BufReader::new(server_read), server_write).await });
    let (client_read, client_write) = split(client);
    let worker = WorkerClient::new(McpChannel::connect(client_read, client_write, ChannelOptions::default()));
    worker.initialize().await.unwrap();

    let oracle = TitleOracle { answers: vec![("Retrieval for long documents", "Score: 8/10 - Useful for RAG.")], calls: AtomicUsize::new(0) };
    let scorer = RelevanceScorer::new(oracle, "profile");
    let report = run_pipeline(&worker, &scorer, &params(&["retrieval"]), now()).await;

    assert_eq!(report.total_scanned, 2);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.relevant.len(), 1);
    let top = &report.relevant[0];
    assert_eq!(top.id, "http://arxiv.org/abs/2501.00011v1");
    assert_eq!(top.score, Some(8));
    assert_eq!(top.reasoning.as_deref(), Some("Useful for RAG."));
    assert_eq!(top.abstract_text.as_deref(), Some("Long context retrieval."));
    assert!(top.categories.contains("cs.CL"));
}
