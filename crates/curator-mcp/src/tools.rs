//! Argument and result documents of the two worker tools.

use curator_types::Paper;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_PAPERS_PER_CATEGORY: usize = 200;
pub const MAX_ABSTRACT_BATCH: usize = 20;

fn default_papers_per_category() -> usize { 50 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitlesArgs {
    #[serde(default = "default_papers_per_category")]
    pub papers_per_category: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbstractsArgs {
    pub paper_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TitlesResult {
    pub total: usize,
    #[serde(default)]
    pub by_category: BTreeMap<String, usize>,
    #[serde(default)]
    pub papers: Vec<Paper>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbstractsResult {
    pub requested: usize,
    pub fetched: usize,
    #[serde(default)]
    pub papers: Vec<Paper>,
}

/// Tool descriptors returned by `tools/list`.
pub fn tool_descriptors() -> serde_json::Value {
    serde_json::json!([
        {
            "name": crate::TOOL_GET_ALL_TITLES,
            "description": "List the newest papers across the configured arXiv categories, deduplicated and newest first.",
            "inputSchema": {
                "type": "object",
                "properties": {"papers_per_category": {"type": "integer", "minimum": 1, "maximum": MAX_PAPERS_PER_CATEGORY}},
            }
        },
        {
            "name": crate::TOOL_GET_ABSTRACTS,
            "description": "Fetch full abstracts for up to 20 arXiv paper URLs.",
            "inputSchema": {
                "type": "object",
                "properties": {"paper_urls": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_ABSTRACT_BATCH}},
                "required": ["paper_urls"]
            }
        }
    ])
}
