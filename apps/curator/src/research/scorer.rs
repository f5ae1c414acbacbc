use super::types::Assessment;
use crate::prompt::evaluation_prompt;
use anyhow::Context;
use async_trait::async_trait;
use curator_types::Paper;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const SCORING_FALLBACK: &str = "Scoring unavailable: could not reach the language model.";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

static SCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Score:\s*(\d+)").expect("score pattern"));
static SCORE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Score:\s*\d+\s*/\s*10\s*-\s*").expect("prefix pattern"));

/// Text in, text out. The scorer does not care which model answers.
#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self { Self { temperature: 0.2, top_p: 0.9, num_predict: 256 } }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` without streaming.
pub struct OllamaOracle {
    http: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaOracle {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .context("building HTTP client for the language model")?;
        Ok(Self { http, base_url: base_url.into(), model: model.into(), options: GenerationOptions::default() })
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn endpoint(&self) -> String { format!("{}/api/generate", self.base_url.trim_end_matches('/')) }
}

#[async_trait]
impl TextOracle for OllamaOracle {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let body = GenerateRequest { model: &self.model, prompt, stream: false, options: self.options };
        let resp = self.http.post(self.endpoint()).json(&body).send().await
            .with_context(|| format!("POST {}", self.endpoint()))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("language model returned HTTP {}", status);
        }
        let parsed: GenerateResponse = resp.json().await.context("decoding generate response")?;
        Ok(parsed.response)
    }
}

pub struct RelevanceScorer<O> {
    oracle: O,
    profile: String,
}

impl<O: TextOracle> RelevanceScorer<O> {
    pub fn new(oracle: O, profile: impl Into<String>) -> Self { Self { oracle, profile: profile.into() } }

    pub fn oracle(&self) -> &O { &self.oracle }

    /// Never fails: an unreachable oracle yields score 0 with a fixed explanation.
    pub async fn score(&self, paper: &Paper) -> Assessment {
        let prompt = evaluation_prompt(&self.profile, paper);
        match self.oracle.generate(&prompt).await {
            Ok(text) => {
                let outcome = if SCORE_RE.is_match(&text) { "ok" } else { "unparsed" };
                curator_telemetry::inc_score(outcome);
                let a = parse_assessment(&text);
                debug!(id = %paper.short_id(), score = a.score, outcome, "paper scored");
                a
            }
            Err(e) => {
                curator_telemetry::inc_score("fallback");
                warn!(id = %paper.short_id(), error = %format!("{:#}", e), "scoring failed");
                Assessment { score: 0, reasoning: SCORING_FALLBACK.to_string() }
            }
        }
    }
}

/// `Score: 7/10 - text` gives 7 and `text`. Without the `Score: X/10 -` prefix
/// the answer is kept verbatim as reasoning; no score marker at all gives 0.
pub fn parse_assessment(text: &str) -> Assessment {
    let score = SCORE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().parse::<u32>().map(|n| n.min(10) as u8).unwrap_or(10))
        .unwrap_or(0);
    let reasoning = if SCORE_PREFIX_RE.is_match(text) {
        SCORE_PREFIX_RE.replace(text, "").trim().to_string()
    } else {
        text.to_string()
    };
    Assessment { score, reasoning }
}
