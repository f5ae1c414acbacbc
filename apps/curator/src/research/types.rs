use curator_types::Paper;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub papers_per_category: usize,
    pub days_back: i64,
    pub max_candidates: usize,
    pub min_score: u8,
    pub keywords: Vec<String>,
    /// Gap between consecutive scoring calls.
    pub score_pause: Duration,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            papers_per_category: 100,
            days_back: 3,
            max_candidates: 15,
            min_score: 6,
            keywords: crate::config::DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            score_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurationReport {
    pub total_scanned: usize,
    pub recent: usize,
    pub candidates: usize,
    /// Every candidate that had an abstract, in candidate order, with its score.
    pub analyzed: Vec<Paper>,
    /// Analyzed papers at or above the threshold, highest score first.
    pub relevant: Vec<Paper>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub score: u8,
    pub reasoning: String,
}
