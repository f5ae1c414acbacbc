//! Paper record shared by the arXiv worker and the curator pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Feed entry URI, e.g. `http://arxiv.org/abs/2501.01234v1`. Dedup key.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: vec![],
            published_at: None,
            categories: BTreeSet::new(),
            abstract_text: None,
            score: None,
            reasoning: None,
        }
    }

    /// Short arXiv id as accepted by `id_list`, e.g. `2501.01234v1` or `hep-th/9901001v2`.
    pub fn short_id(&self) -> String { short_id(&self.id) }

    pub fn authors_joined(&self) -> String { self.authors.join(", ") }

    /// Case-insensitive substring match of any keyword against title and authors.
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let haystack = format!("{} {}", self.title, self.authors_joined()).to_lowercase();
        keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| haystack.contains(&k))
    }

    pub fn merge_categories(&mut self, other: &Paper) {
        self.categories.extend(other.categories.iter().cloned());
    }
}

/// Accepts the URL form (`http://arxiv.org/abs/<id>`), the `arXiv:` prefixed form,
/// or a bare id.
pub fn short_id(id_or_url: &str) -> String {
    let s = id_or_url.trim();
    let tail = match s.rfind("/abs/") {
        Some(ix) => &s[ix + "/abs/".len()..],
        None => s.strip_prefix("arXiv:").unwrap_or(s),
    };
    tail.trim_matches('/').to_string()
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
