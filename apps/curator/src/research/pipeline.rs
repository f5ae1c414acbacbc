use super::scorer::{RelevanceScorer, TextOracle};
use super::types::{CurationReport, PipelineParams};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use curator_mcp::tools::{AbstractsResult, TitlesResult};
use curator_types::Paper;
use std::collections::HashMap;
use tracing::{info, warn};

const MAX_DAYS_BACK: i64 = 36_500;

/// The two worker operations the pipeline needs.
#[async_trait]
pub trait PaperWorker: Send + Sync {
    async fn get_all_titles(&self, papers_per_category: usize) -> anyhow::Result<TitlesResult>;
    async fn get_abstracts_for_papers(&self, paper_urls: &[String]) -> anyhow::Result<AbstractsResult>;
}

/// Keeps papers published at or after `now - days_back`. Undated papers are dropped.
pub fn filter_recent(papers: Vec<Paper>, days_back: i64, now: DateTime<Utc>) -> Vec<Paper> {
    let cutoff = now - ChronoDuration::days(days_back.clamp(0, MAX_DAYS_BACK));
    papers.into_iter().filter(|p| p.published_at.map_or(false, |t| t >= cutoff)).collect()
}

pub fn filter_keywords(papers: Vec<Paper>, keywords: &[String], max_candidates: usize) -> Vec<Paper> {
    papers.into_iter().filter(|p| p.matches_any(keywords)).take(max_candidates).collect()
}

/// Stable: equal scores keep their analysis order.
pub fn rank_relevant(analyzed: &[Paper], min_score: u8) -> Vec<Paper> {
    let mut relevant: Vec<Paper> = analyzed.iter().filter(|p| p.score.unwrap_or(0) >= min_score).cloned().collect();
    relevant.sort_by(|a, b| b.score.cmp(&a.score));
    relevant
}

/// Copies fetched abstracts onto the candidates, keeping candidate order.
/// Candidates without a fetched abstract are dropped.
fn attach_abstracts(candidates: Vec<Paper>, fetched: AbstractsResult) -> Vec<Paper> {
    let mut by_id: HashMap<String, Paper> = fetched.papers.into_iter().map(|p| (p.id.clone(), p)).collect();
    candidates
        .into_iter()
        .filter_map(|mut c| {
            let f = by_id.remove(&c.id)?;
            c.abstract_text = Some(f.abstract_text.clone()?);
            c.merge_categories(&f);
            Some(c)
        })
        .collect()
}

/// A failed worker round trip ends the run early with whatever counts were
/// reached; it never fails the run.
pub async fn run_pipeline<W, O>(worker: &W, scorer: &RelevanceScorer<O>, params: &PipelineParams, now: DateTime<Utc>) -> CurationReport
where
    W: PaperWorker + ?Sized,
    O: TextOracle,
{
    let titles = match worker.get_all_titles(params.papers_per_category).await {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "title fetch failed; nothing to curate");
            return CurationReport::default();
        }
    };
    let total_scanned = titles.papers.len();
    info!(total = total_scanned, by_category = ?titles.by_category, "titles fetched");

    let recent = filter_recent(titles.papers, params.days_back, now);
    info!(recent = recent.len(), days = params.days_back, "date filter applied");
    let recent_count = recent.len();

    let candidates = filter_keywords(recent, &params.keywords, params.max_candidates);
    info!(candidates = candidates.len(), max = params.max_candidates, "keyword filter applied");
    if candidates.is_empty() {
        info!("no candidates; nothing to score");
        return CurationReport { total_scanned, recent: recent_count, ..Default::default() };
    }
    let candidate_count = candidates.len();

    let urls: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
    let fetched = match worker.get_abstracts_for_papers(&urls).await {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %format!("{:#}", e), candidates = candidate_count, "abstract fetch failed; skipping scoring");
            return CurationReport { total_scanned, recent: recent_count, candidates: candidate_count, ..Default::default() };
        }
    };
    info!(requested = fetched.requested, fetched = fetched.fetched, "abstracts fetched");

    let mut analyzed = attach_abstracts(candidates, fetched);
    for (ix, paper) in analyzed.iter_mut().enumerate() {
        if ix > 0 { tokio::time::sleep(params.score_pause).await; }
        let a = scorer.score(paper).await;
        paper.score = Some(a.score);
        paper.reasoning = Some(a.reasoning);
    }
    info!(analyzed = analyzed.len(), "scoring complete");

    let relevant = rank_relevant(&analyzed, params.min_score);
    info!(relevant = relevant.len(), min_score = params.min_score, "threshold applied");
    CurationReport { total_scanned, recent: recent_count, candidates: candidate_count, analyzed, relevant }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn dated(id: &str, title: &str, at: DateTime<Utc>) -> Paper {
        let mut p = Paper::new(id, title);
        p.published_at = Some(at);
        p
    }

    fn scored(id: &str, score: u8) -> Paper {
        let mut p = Paper::new(id, id);
        p.score = Some(score);
        p
    }

    #[test]
    fn date_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let edge = now - ChronoDuration::days(3);
        let papers = vec![
            dated("edge", "edge", edge),
            dated("early", "early", edge - ChronoDuration::seconds(1)),
            Paper::new("undated", "undated"),
            dated("fresh", "fresh", now),
        ];
        let ids: Vec<String> = filter_recent(papers, 3, now).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["edge".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn keywords_ignore_case() {
        let kw = vec!["rlhf".to_string()];
        let out = filter_keywords(vec![Paper::new("1", "Scaling RLHF to long contexts"), Paper::new("2", "Graph coloring")], &kw, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "1");
    }

    #[test]
    fn keywords_also_match_authors() {
        let mut p = Paper::new("1", "Untitled");
        p.authors = vec!["Ada Transformer".into()];
        assert_eq!(filter_keywords(vec![p], &["transformer".to_string()], 5).len(), 1);
    }

    #[test]
    fn candidate_cap_keeps_order() {
        let papers: Vec<Paper> = (0..8).map(|i| Paper::new(format!("p{}", i), "LLM study")).collect();
        let ids: Vec<String> = filter_keywords(papers, &["llm".to_string()], 3).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn ranking_is_stable_and_thresholded() {
        let analyzed = vec![scored("paper1", 3), scored("paper2", 7), scored("paper3", 7), scored("paper4", 5)];
        let ids: Vec<String> = rank_relevant(&analyzed, 5).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["paper2", "paper3", "paper4"]);
    }

    #[test]
    fn abstracts_merge_by_id_in_candidate_order() {
        let candidates = vec![Paper::new("a", "A"), Paper::new("b", "B"), Paper::new("c", "C")];
        let mut fc = Paper::new("c", "C");
        fc.abstract_text = Some("abstract c".into());
        fc.categories.insert("cs.IR".into());
        let mut fa = Paper::new("a", "A");
        fa.abstract_text = Some("abstract a".into());
        let out = attach_abstracts(candidates, AbstractsResult { requested: 3, fetched: 2, papers: vec![fc, fa] });
        let ids: Vec<&str> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(out[1].categories.contains("cs.IR"));
    }
}
