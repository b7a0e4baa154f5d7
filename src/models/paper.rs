//! Candidate and recommended paper types.

use serde::{Deserialize, Serialize};

/// A candidate paper pulled from the feed, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePaper {
    /// Short arXiv identifier with any version suffix stripped.
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub pdf_url: String,
    pub published_date: String,
}

/// A candidate paired with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPaper {
    pub paper: CandidatePaper,
    pub score: f64,
}

/// A formatted recommendation, as cached and sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedPaper {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub arxiv_id: String,
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_url: Option<String>,
    /// Relevance score rounded to two decimals.
    pub score: f64,
    /// Date the recommendation was generated, `YYYY-MM-DD`.
    pub date: String,
}
