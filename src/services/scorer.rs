//! Relevance scoring of candidates against the reference corpus.
//!
//! The default scorer builds a TF-IDF model over the reference papers and
//! scores each candidate as a recency-weighted average of its cosine
//! similarity to every reference paper, so recently added references pull
//! harder than old ones.

use std::collections::{HashMap, HashSet};

use crate::models::{CandidatePaper, CorpusItem, ScoredPaper};

/// Ranks candidate papers against a reference corpus.
pub trait Scorer: Send + Sync {
    /// Score every candidate and return them sorted best first. Ties keep
    /// retrieval order.
    fn rank(&self, candidates: Vec<CandidatePaper>, reference: &[CorpusItem]) -> Vec<ScoredPaper>;
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "with", "this", "that", "from", "can", "our",
    "has", "have", "was", "were", "been", "which", "these", "those", "than", "into",
    "such", "also", "both", "each", "its", "using", "used", "use", "based", "results",
    "show", "paper", "propose", "proposed", "present", "approach", "method", "methods",
    "model", "models", "via", "between", "while", "where", "when", "more", "most", "over",
];

/// TF-IDF cosine scorer with recency weighting.
#[derive(Debug, Default)]
pub struct TfidfScorer;

impl Scorer for TfidfScorer {
    fn rank(&self, candidates: Vec<CandidatePaper>, reference: &[CorpusItem]) -> Vec<ScoredPaper> {
        let reference_tokens: Vec<Vec<String>> = reference
            .iter()
            .map(|item| tokenize(&format!("{} {}", item.title, item.abstract_text)))
            .collect();

        let Some(model) = TfidfModel::fit(&reference_tokens) else {
            // Nothing to compare against; keep retrieval order.
            return candidates
                .into_iter()
                .map(|paper| ScoredPaper { paper, score: 0.0 })
                .collect();
        };

        let weights = recency_weights(reference);
        let weight_total: f64 = weights.iter().sum();
        let reference_vectors: Vec<_> = reference_tokens
            .iter()
            .map(|tokens| model.vector(tokens))
            .collect();

        let mut scored: Vec<ScoredPaper> = candidates
            .into_iter()
            .map(|paper| {
                let tokens = tokenize(&format!("{} {}", paper.title, paper.abstract_text));
                let vector = model.vector(&tokens);
                let score = reference_vectors
                    .iter()
                    .zip(&weights)
                    .map(|(reference_vector, weight)| weight * cosine(&vector, reference_vector))
                    .sum::<f64>()
                    / weight_total;
                ScoredPaper { paper, score }
            })
            .collect();

        // Stable sort keeps retrieval order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}

/// Harmonic decay by recency of addition: the newest reference gets weight
/// 1, the next 1/2, then 1/3, and so on.
fn recency_weights(reference: &[CorpusItem]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..reference.len()).collect();
    order.sort_by(|&a, &b| reference[b].date_added.cmp(&reference[a].date_added));
    let mut weights = vec![0.0; reference.len()];
    for (rank, &index) in order.iter().enumerate() {
        weights[index] = 1.0 / (1.0 + rank as f64);
    }
    weights
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2 && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

struct TfidfModel {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfModel {
    /// Fit vocabulary and smoothed IDF over the reference documents.
    /// `None` when the documents contain no usable terms.
    fn fit(documents: &[Vec<String>]) -> Option<Self> {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        for document in documents {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in document {
                if seen.insert(term) {
                    let next = vocabulary.len();
                    let index = *vocabulary.entry(term.clone()).or_insert(next);
                    if index == document_frequency.len() {
                        document_frequency.push(0);
                    }
                    document_frequency[index] += 1;
                }
            }
        }
        if vocabulary.is_empty() {
            return None;
        }
        let total = documents.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + total) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        Some(Self { vocabulary, idf })
    }

    /// L2-normalized sparse TF-IDF vector. Terms outside the vocabulary are
    /// dropped.
    fn vector(&self, tokens: &[String]) -> HashMap<usize, f64> {
        let mut values: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(&index) = self.vocabulary.get(token) {
                *values.entry(index).or_insert(0.0) += 1.0;
            }
        }
        for (index, value) in values.iter_mut() {
            *value *= self.idf[*index];
        }
        let norm = values.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in values.values_mut() {
                *value /= norm;
            }
        }
        values
    }
}

/// Dot product of two L2-normalized sparse vectors.
fn cosine(a: &HashMap<usize, f64>, b: &HashMap<usize, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(index, value)| large.get(index).map(|other| value * other))
        .sum()
}
