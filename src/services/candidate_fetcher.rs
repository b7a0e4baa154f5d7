//! Candidate retrieval from the feed.
//!
//! One feed fetch decides the identifier list: newly announced entries when
//! there are any, otherwise every feed entry. Details are then fetched in
//! sequential batches; a failed batch is logged and skipped so one bad
//! batch never sinks the run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::events::ProgressSink;
use crate::models::CandidatePaper;
use crate::services::arxiv_client::{strip_version, FeedError, FeedService, FEED_ERROR_MARKER};

const OAI_PREFIX: &str = "oai:arXiv.org:";

/// Fetches scoring candidates from the feed service.
pub struct CandidateFetcher {
    feed: Arc<dyn FeedService>,
    batch_size: usize,
}

impl CandidateFetcher {
    pub fn new(feed: Arc<dyn FeedService>, batch_size: usize) -> Self {
        Self {
            feed,
            batch_size: batch_size.max(1),
        }
    }

    /// Fetch candidates for `query`, reporting progress along the way.
    ///
    /// Returns however many details survived the batch fetches; the caller
    /// decides whether an empty result is fatal. Cancellation is honored at
    /// batch boundaries.
    pub async fn fetch(
        &self,
        query: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidatePaper>, FeedError> {
        progress
            .progress(format!("Fetching the arXiv feed ({})...", query), Some(30))
            .await;
        let document = self.feed.fetch_feed(query).await?;
        if document.title.contains(FEED_ERROR_MARKER) {
            return Err(FeedError::InvalidQuery(query.to_string()));
        }

        let new_ids: Vec<String> = document
            .entries
            .iter()
            .filter(|entry| entry.announce_type.as_deref() == Some("new"))
            .map(|entry| normalize_feed_id(&entry.id))
            .collect();

        let ids = if new_ids.is_empty() {
            progress
                .progress(
                    "No newly announced papers, falling back to the full feed...",
                    Some(35),
                )
                .await;
            let all: Vec<String> = document
                .entries
                .iter()
                .map(|entry| normalize_feed_id(&entry.id))
                .collect();
            progress
                .progress(
                    format!("Found {} papers in the feed, processing all of them", all.len()),
                    Some(38),
                )
                .await;
            all
        } else {
            progress
                .progress(
                    format!(
                        "Found {} newly announced papers ({} feed entries)",
                        new_ids.len(),
                        document.entries.len()
                    ),
                    Some(38),
                )
                .await;
            new_ids
        };

        progress
            .progress(format!("Processing {} candidate papers", ids.len()), Some(40))
            .await;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let total_batches = ids.len().div_ceil(self.batch_size);
        progress
            .progress(
                format!(
                    "Fetching paper details in {} batches of up to {}...",
                    total_batches, self.batch_size
                ),
                Some(42),
            )
            .await;

        let mut papers = Vec::new();
        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("candidate fetch cancelled at batch boundary");
                break;
            }
            let batch_number = index + 1;
            // Batches span the 40..70 band of the progress scale.
            let percent = 40 + ((batch_number * 30) / total_batches) as u8;
            progress
                .progress(
                    format!(
                        "Fetching batch {}/{} of paper details...",
                        batch_number, total_batches
                    ),
                    Some(percent),
                )
                .await;
            match self.feed.fetch_details(batch).await {
                Ok(batch_papers) => {
                    papers.extend(batch_papers);
                    progress
                        .progress(
                            format!(
                                "Fetched {}/{} paper details (batch {}/{})",
                                papers.len(),
                                ids.len(),
                                batch_number,
                                total_batches
                            ),
                            Some(percent),
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(
                        batch = batch_number,
                        error = %e,
                        "batch fetch failed, continuing with the rest"
                    );
                    progress
                        .progress(
                            format!("Batch {} failed, continuing...", batch_number),
                            Some(percent),
                        )
                        .await;
                }
            }
        }

        Ok(papers)
    }
}

/// Feed entry id to short arXiv id: drop the OAI prefix and any version
/// suffix.
pub(crate) fn normalize_feed_id(raw: &str) -> String {
    let id = raw.strip_prefix(OAI_PREFIX).unwrap_or(raw);
    strip_version(id).to_string()
}
