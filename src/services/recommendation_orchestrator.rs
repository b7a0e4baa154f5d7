//! Recommendation pipeline orchestration.
//!
//! A run moves through fixed stages: recommendation cache probe, corpus
//! load, selection filter, candidate fetch, scoring, truncation, formatting
//! (with optional code link lookup), cache write. Progress is reported
//! through a [`ProgressSink`] and every run ends in exactly one terminal
//! outcome: success (with papers), empty (nothing to recommend from), or
//! error. Stage failures are caught here so the terminal frame always goes
//! out. A cancelled run stops at the next stage boundary and never writes
//! the recommendation cache.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{CacheStore, Fingerprint};
use crate::events::{PipelineOutcome, ProgressSink};
use crate::models::{Identity, LibraryCredentials, RecommendedPaper, ScoredPaper};
use crate::services::candidate_fetcher::CandidateFetcher;
use crate::services::code_link::CodeLinkService;
use crate::services::corpus_loader::CorpusLoader;
use crate::services::scorer::Scorer;

/// Parameters of one recommendation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub query: String,
    pub date_range: Option<String>,
    pub force_refresh: bool,
    /// Restrict the reference corpus to these item keys. `None` means the
    /// whole library.
    pub selected_keys: Option<Vec<String>>,
}

/// Cached result of a completed run, keyed by the request fingerprint.
#[derive(Debug, Serialize, Deserialize)]
struct RecommendationCachePayload {
    papers: Vec<RecommendedPaper>,
    arxiv_query: String,
    date_range: Option<String>,
    selected_paper_keys: Option<Vec<String>>,
}

pub struct RecommendationOrchestrator {
    cache: CacheStore,
    corpus_loader: CorpusLoader,
    fetcher: CandidateFetcher,
    scorer: Arc<dyn Scorer>,
    code_links: Option<Arc<dyn CodeLinkService>>,
    max_results: usize,
}

impl RecommendationOrchestrator {
    pub fn new(
        cache: CacheStore,
        corpus_loader: CorpusLoader,
        fetcher: CandidateFetcher,
        scorer: Arc<dyn Scorer>,
        code_links: Option<Arc<dyn CodeLinkService>>,
        max_results: usize,
    ) -> Self {
        Self {
            cache,
            corpus_loader,
            fetcher,
            scorer,
            code_links,
            max_results,
        }
    }

    /// Run the pipeline to its terminal outcome.
    ///
    /// The terminal frame is always emitted into the sink, even on failure;
    /// the outcome is also returned for callers that do not stream.
    pub async fn run(
        &self,
        identity: &Identity,
        credentials: &LibraryCredentials,
        request: RecommendationRequest,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            library_id = %identity.library_id(),
            query = %request.query,
            force_refresh = request.force_refresh,
            selected = request.selected_keys.as_ref().map(|k| k.len()),
            "starting recommendation run"
        );

        let outcome = match self
            .execute(identity, credentials, &request, sink, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(%run_id, error = %format!("{e:#}"), "recommendation run failed");
                sink.progress(format!("An error occurred: {e:#}"), Some(100))
                    .await;
                PipelineOutcome::Error {
                    message: format!("{e:#}"),
                }
            }
        };

        match &outcome {
            PipelineOutcome::Success { papers, cached, .. } => {
                tracing::info!(%run_id, papers = papers.len(), cached, "recommendation run finished")
            }
            PipelineOutcome::Empty { reason } => {
                tracing::info!(%run_id, reason, "recommendation run had nothing to recommend")
            }
            PipelineOutcome::Error { message } => {
                tracing::warn!(%run_id, message, "recommendation run ended in error")
            }
        }

        sink.terminal(outcome.to_terminal()).await;
        outcome
    }

    async fn execute(
        &self,
        identity: &Identity,
        credentials: &LibraryCredentials,
        request: &RecommendationRequest,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let fingerprint = Fingerprint::recommendations(
            identity,
            &request.query,
            request.date_range.as_deref(),
            request.selected_keys.as_deref(),
        );

        if !request.force_refresh {
            if let Some(envelope) = self
                .cache
                .get::<RecommendationCachePayload>(identity, &fingerprint)
                .await
            {
                // Served straight from cache; only the reference count is
                // recomputed, since the corpus may have changed since.
                let (corpus, _) = self
                    .corpus_loader
                    .load(identity, credentials, false)
                    .await?;
                let reference_count = match &request.selected_keys {
                    Some(keys) => corpus.iter().filter(|item| keys.contains(&item.key)).count(),
                    None => corpus.len(),
                };
                sink.progress("Using cached recommendations", Some(100)).await;
                return Ok(PipelineOutcome::Success {
                    papers: envelope.payload.papers,
                    cached: true,
                    reference_count,
                });
            }
        }

        sink.progress("Loading your reference library...", Some(10))
            .await;
        let (corpus, _collections) = self
            .corpus_loader
            .load(identity, credentials, false)
            .await?;
        if corpus.is_empty() {
            sink.progress("Your reference library is empty, nothing to recommend", Some(100))
                .await;
            return Ok(PipelineOutcome::Empty {
                reason: "The reference library is empty".into(),
            });
        }

        let corpus = match &request.selected_keys {
            Some(keys) => {
                let before = corpus.len();
                let filtered: Vec<_> = corpus
                    .into_iter()
                    .filter(|item| keys.contains(&item.key))
                    .collect();
                sink.progress(
                    format!(
                        "Loaded {} selected papers (filtered from {})",
                        filtered.len(),
                        before
                    ),
                    Some(20),
                )
                .await;
                filtered
            }
            None => {
                sink.progress(
                    format!("Loaded {} papers from your library", corpus.len()),
                    Some(20),
                )
                .await;
                corpus
            }
        };
        if corpus.is_empty() {
            sink.progress("No selected papers matched, nothing to recommend", Some(100))
                .await;
            return Ok(PipelineOutcome::Empty {
                reason: "None of the selected papers were found".into(),
            });
        }

        ensure_not_cancelled(cancel)?;
        let candidates = self.fetcher.fetch(&request.query, sink, cancel).await?;
        ensure_not_cancelled(cancel)?;
        if candidates.is_empty() {
            sink.progress("Could not retrieve any paper details from arXiv", Some(100))
                .await;
            return Ok(PipelineOutcome::Error {
                message: "Could not retrieve candidate papers, try again later".into(),
            });
        }
        sink.progress(format!("Fetched {} paper details", candidates.len()), Some(70))
            .await;

        sink.progress(
            format!(
                "Scoring {} candidates against {} reference papers...",
                candidates.len(),
                corpus.len()
            ),
            Some(75),
        )
        .await;
        let ranked = self.scorer.rank(candidates, &corpus);
        let top_score = ranked.first().map(|paper| paper.score).unwrap_or(0.0);
        sink.progress(format!("Scores computed (top score: {:.2})", top_score), Some(85))
            .await;

        let top: Vec<ScoredPaper> = ranked.into_iter().take(self.max_results).collect();
        sink.progress(format!("Preparing results (top {})", top.len()), Some(90))
            .await;

        let total = top.len();
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut papers = Vec::with_capacity(total);
        for (index, scored) in top.into_iter().enumerate() {
            let position = index + 1;
            let code_url = match &self.code_links {
                Some(service) => match service.find_code_url(&scored.paper.id).await {
                    Ok(url) => url,
                    Err(e) => {
                        // Code links are decoration; losing one is fine.
                        tracing::debug!(paper = %scored.paper.id, error = %e, "code link lookup failed");
                        None
                    }
                },
                None => None,
            };
            papers.push(format_paper(scored, code_url, &today));
            if self.code_links.is_some() && position % 10 == 0 {
                let percent = 90 + ((position * 5) / total) as u8;
                sink.progress(
                    format!("Fetching code links ({}/{})...", position, total),
                    Some(percent),
                )
                .await;
            }
        }

        sink.progress(format!("Done! Recommended {} papers", papers.len()), Some(100))
            .await;

        ensure_not_cancelled(cancel)?;
        self.cache
            .put(
                identity,
                &fingerprint,
                RecommendationCachePayload {
                    papers: papers.clone(),
                    arxiv_query: request.query.clone(),
                    date_range: request.date_range.clone(),
                    selected_paper_keys: request.selected_keys.clone(),
                },
            )
            .await;

        Ok(PipelineOutcome::Success {
            papers,
            cached: false,
            reference_count: corpus.len(),
        })
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        anyhow::bail!("request cancelled");
    }
    Ok(())
}

fn format_paper(scored: ScoredPaper, code_url: Option<String>, today: &str) -> RecommendedPaper {
    let score = if scored.score.is_finite() {
        (scored.score * 100.0).round() / 100.0
    } else {
        0.0
    };
    RecommendedPaper {
        title: scored.paper.title,
        authors: scored.paper.authors,
        abstract_text: scored.paper.abstract_text,
        arxiv_id: scored.paper.id,
        pdf_url: scored.paper.pdf_url,
        code_url,
        score,
        date: today.to_string(),
    }
}
