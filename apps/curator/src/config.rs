use crate::mcp_client::ChannelOptions;
use crate::research::types::PipelineParams;
use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const DEFAULT_CONFIG_PATH: &str = "config/curator.toml";
pub const WORKER_BIN_NAME: &str = "mcp-arxiv";

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "language model", "llm", "transformer", "retrieval", "rag", "rlhf", "preference", "alignment",
    "reasoning", "agent", "instruction", "fine-tuning", "in-context", "benchmark", "evaluation",
];

#[derive(Debug, Clone, Parser)]
#[command(name = "curator", version, about = "Score the newest arXiv papers against a reading profile")]
pub struct Cli {
    /// Papers to request per category [default: 100]
    #[arg(long)]
    pub papers: Option<usize>,
    /// Only keep papers published within this many days [default: 3]
    #[arg(long)]
    pub days: Option<i64>,
    /// Maximum papers to fetch abstracts for and score [default: 15]
    #[arg(long)]
    pub candidates: Option<usize>,
    /// Minimum score (0-10) for a paper to be reported [default: 6]
    #[arg(long = "min-score")]
    pub min_score: Option<u8>,
    /// TOML config file
    #[arg(long, env = "CURATOR_CONFIG")]
    pub config: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
    /// Print Prometheus counters to stderr after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Command that starts the worker. Defaults to `mcp-arxiv` next to this binary.
    pub bin: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self { Self { bin: None, request_timeout_secs: 60 } }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Passed to the worker; its built-in list applies when empty.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self { Self { keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect() } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub base_url: String,
    pub model: String,
    pub profile: Option<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:11434".into(), model: "llama3.1:8b".into(), profile: None }
    }
}

impl ScorerConfig {
    pub fn profile(&self) -> &str {
        self.profile.as_deref().filter(|p| !p.trim().is_empty()).unwrap_or(crate::prompt::DEFAULT_PROFILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub papers: usize,
    pub days: i64,
    pub candidates: usize,
    pub min_score: u8,
}

impl Default for RunDefaults {
    fn default() -> Self { Self { papers: 100, days: 3, candidates: 15, min_score: 6 } }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub feed: FeedConfig,
    pub filter: FilterConfig,
    pub scorer: ScorerConfig,
    pub defaults: RunDefaults,
}

impl Config {
    /// Reads `path`, else `CURATOR_CONFIG`, else `config/curator.toml`. A missing
    /// file means built-in defaults; the returned path is `None` in that case.
    pub fn load(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let cfg_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("CURATOR_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let (mut cfg, loaded) = if cfg_path.exists() {
            let text = fs::read_to_string(&cfg_path).with_context(|| format!("reading {}", cfg_path.display()))?;
            (Self::from_toml(&text).with_context(|| format!("parsing {}", cfg_path.display()))?, Some(cfg_path))
        } else {
            (Self::default(), None)
        };

        if let Ok(bin) = env::var("CURATOR_WORKER_BIN") { cfg.worker.bin = Some(bin); }
        if let Ok(url) = env::var("OLLAMA_URL") { cfg.scorer.base_url = url; }
        if let Ok(model) = env::var("OLLAMA_MODEL") { cfg.scorer.model = model; }
        Ok((cfg, loaded))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> { Ok(toml::from_str(text)?) }

    /// CLI flags win over `[defaults]`.
    pub fn pipeline_params(&self, cli: &Cli) -> PipelineParams {
        PipelineParams {
            papers_per_category: cli.papers.unwrap_or(self.defaults.papers),
            days_back: cli.days.unwrap_or(self.defaults.days),
            max_candidates: cli.candidates.unwrap_or(self.defaults.candidates),
            min_score: cli.min_score.unwrap_or(self.defaults.min_score).min(10),
            keywords: self.filter.keywords.clone(),
            score_pause: Duration::from_secs(1),
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions { request_timeout: Duration::from_secs(self.worker.request_timeout_secs.max(1)), ..Default::default() }
    }

    pub fn worker_bin(&self) -> String {
        if let Some(bin) = self.worker.bin.as_deref().filter(|b| !b.trim().is_empty()) {
            return bin.to_string();
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BIN_NAME)))
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| WORKER_BIN_NAME.to_string())
    }

    /// Environment handed to the worker process.
    pub fn worker_env(&self) -> Vec<(String, String)> {
        let cats: Vec<&str> = self.feed.categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        if cats.is_empty() { vec![] } else { vec![("CURATOR_CATEGORIES".to_string(), cats.join(","))] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = Config::from_toml("[scorer]\nmodel = \"qwen2.5:7b\"\n\n[defaults]\ndays = 7\n").unwrap();
        assert_eq!(cfg.scorer.model, "qwen2.5:7b");
        assert_eq!(cfg.scorer.base_url, "http://localhost:11434");
        assert_eq!(cfg.defaults.days, 7);
        assert_eq!(cfg.defaults.candidates, 15);
        assert_eq!(cfg.worker.request_timeout_secs, 60);
        assert!(cfg.filter.keywords.iter().any(|k| k == "rlhf"));
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cfg = Config::default();
        let cli = Cli::parse_from(["curator", "--days", "1", "--min-score", "8"]);
        let p = cfg.pipeline_params(&cli);
        assert_eq!(p.days_back, 1);
        assert_eq!(p.min_score, 8);
        assert_eq!(p.papers_per_category, 100);
        assert_eq!(p.max_candidates, 15);
    }

    #[test]
    fn categories_are_passed_to_worker() {
        let cfg = Config::from_toml("[feed]\ncategories = [\"cs.AI\", \" cs.LG \", \"\"]\n").unwrap();
        assert_eq!(cfg.worker_env(), vec![("CURATOR_CATEGORIES".to_string(), "cs.AI,cs.LG".to_string())]);
        assert!(Config::default().worker_env().is_empty());
    }

    #[test]
    fn blank_profile_uses_builtin() {
        let mut s = ScorerConfig::default();
        s.profile = Some("   ".into());
        assert_eq!(s.profile(), crate::prompt::DEFAULT_PROFILE);
    }
}
