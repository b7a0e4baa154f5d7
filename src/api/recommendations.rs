//! Recommendation endpoints: SSE stream and one-shot JSON.
//!
//! The stream endpoint spawns the pipeline, bridges its progress channel
//! into SSE `data:` frames, and closes the stream right after the terminal
//! frame. Dropping the stream (client disconnect) cancels the pipeline via
//! a drop guard. The one-shot endpoint runs the same pipeline with a
//! discarding sink and returns only the terminal outcome.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::api::auth::LibraryAuth;
use crate::error::{ApiError, ApiResult};
use crate::events::{PipelineOutcome, ProgressSink, StreamEvent};
use crate::models::RecommendedPaper;
use crate::services::RecommendationRequest;
use crate::AppState;

/// Query parameters shared by both endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationParams {
    pub arxiv_query: Option<String>,
    pub date_range: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
    /// Comma-separated item keys.
    pub selected_paper_keys: Option<String>,
}

impl RecommendationParams {
    fn into_request(self, default_query: &str) -> RecommendationRequest {
        let query = self
            .arxiv_query
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| default_query.to_string());
        let date_range = self.date_range.filter(|d| !d.trim().is_empty());
        RecommendationRequest {
            query,
            date_range,
            force_refresh: self.force_refresh,
            selected_keys: parse_selected_keys(self.selected_paper_keys.as_deref()),
        }
    }
}

/// Parse the selection parameter. Blank entries are dropped; a selection
/// with no usable keys means "whole library" and becomes `None`.
pub(crate) fn parse_selected_keys(raw: Option<&str>) -> Option<Vec<String>> {
    let keys: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

/// GET /api/recommendations/stream
///
/// SSE progress stream for one recommendation run.
pub async fn recommendations_stream(
    State(state): State<AppState>,
    auth: LibraryAuth,
    Query(params): Query<RecommendationParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = params.into_request(&state.settings.arxiv_query);
    tracing::info!(
        library_id = %auth.identity.library_id(),
        query = %request.query,
        "recommendation stream opened"
    );

    let (sink, mut rx) = ProgressSink::channel(100);
    let cancel = CancellationToken::new();
    let pipeline_cancel = cancel.clone();
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        orchestrator
            .run(
                &auth.identity,
                &auth.credentials,
                request,
                &sink,
                &pipeline_cancel,
            )
            .await;
    });

    let stream = async_stream::stream! {
        // Dropping the stream (client gone) cancels the pipeline.
        let _guard = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            let is_terminal = event.is_terminal();
            if let Some(json) = frame_json(&event) {
                yield Ok(Event::default().data(json));
            }
            if is_terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

fn frame_json(event: &StreamEvent) -> Option<String> {
    let result = match event {
        StreamEvent::Progress(update) => serde_json::to_string(update),
        StreamEvent::Terminal(update) => serde_json::to_string(update),
    };
    match result {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize progress frame");
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub success: bool,
    pub papers: Vec<RecommendedPaper>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /api/recommendations
///
/// Same pipeline without the stream. An empty outcome is a 200 with an
/// explanatory message; a pipeline error is a 500.
pub async fn recommendations(
    State(state): State<AppState>,
    auth: LibraryAuth,
    Query(params): Query<RecommendationParams>,
) -> ApiResult<Json<RecommendationsResponse>> {
    let request = params.into_request(&state.settings.arxiv_query);
    let sink = ProgressSink::discard();
    let cancel = CancellationToken::new();

    let outcome = state
        .orchestrator
        .run(&auth.identity, &auth.credentials, request, &sink, &cancel)
        .await;

    match outcome {
        PipelineOutcome::Success {
            papers,
            cached,
            reference_count,
        } => {
            let total = papers.len();
            Ok(Json(RecommendationsResponse {
                success: true,
                papers,
                total: Some(total),
                cached: Some(cached),
                reference_count: Some(reference_count),
                message: None,
            }))
        }
        PipelineOutcome::Empty { reason } => Ok(Json(RecommendationsResponse {
            success: true,
            papers: Vec::new(),
            total: None,
            cached: None,
            reference_count: None,
            message: Some(reason),
        })),
        PipelineOutcome::Error { message } => Err(ApiError::Internal(message)),
    }
}

/// Build recommendation routes
pub fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/recommendations/stream", get(recommendations_stream))
        .route("/api/recommendations", get(recommendations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selected_keys() {
        assert_eq!(parse_selected_keys(None), None);
        assert_eq!(parse_selected_keys(Some("")), None);
        assert_eq!(parse_selected_keys(Some(" , ,")), None);
        assert_eq!(
            parse_selected_keys(Some("K1,K2")),
            Some(vec!["K1".to_string(), "K2".to_string()])
        );
        assert_eq!(
            parse_selected_keys(Some(" K1 , ,K2 ")),
            Some(vec!["K1".to_string(), "K2".to_string()])
        );
    }

    #[test]
    fn test_into_request_defaults() {
        let params = RecommendationParams::default();
        let request = params.into_request("cs.AI+cs.LG");
        assert_eq!(request.query, "cs.AI+cs.LG");
        assert_eq!(request.date_range, None);
        assert!(!request.force_refresh);
        assert_eq!(request.selected_keys, None);
    }

    #[test]
    fn test_into_request_blank_values_fall_back() {
        let params = RecommendationParams {
            arxiv_query: Some("  ".into()),
            date_range: Some("".into()),
            force_refresh: true,
            selected_paper_keys: Some("K1".into()),
        };
        let request = params.into_request("cs.AI");
        assert_eq!(request.query, "cs.AI");
        assert_eq!(request.date_range, None);
        assert!(request.force_refresh);
        assert_eq!(request.selected_keys, Some(vec!["K1".to_string()]));
    }
}
