//! Library browsing and cache management endpoints.

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::auth::LibraryAuth;
use crate::error::ApiResult;
use crate::models::CorpusItem;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PapersResponse {
    pub success: bool,
    pub papers: Vec<CorpusItem>,
    #[serde(rename = "papersByCollection")]
    pub papers_by_collection: BTreeMap<String, Vec<CorpusItem>>,
    pub total: usize,
}

/// GET /api/library/papers
///
/// The cached corpus, both flat and grouped by collection path. An item in
/// several collections appears under each of its paths.
pub async fn papers(
    State(state): State<AppState>,
    auth: LibraryAuth,
) -> ApiResult<Json<PapersResponse>> {
    let (corpus, _) = state
        .corpus_loader
        .load(&auth.identity, &auth.credentials, false)
        .await?;

    let mut by_collection: BTreeMap<String, Vec<CorpusItem>> = BTreeMap::new();
    for item in &corpus {
        for path in &item.collection_paths {
            by_collection
                .entry(path.clone())
                .or_default()
                .push(item.clone());
        }
    }

    let total = corpus.len();
    Ok(Json(PapersResponse {
        success: true,
        papers: corpus,
        papers_by_collection: by_collection,
        total,
    }))
}

#[derive(Debug, Serialize)]
pub struct CollectionsResponse {
    pub success: bool,
    pub collections: Vec<String>,
}

/// GET /api/library/collections
///
/// Sorted distinct collection paths across the corpus.
pub async fn collections(
    State(state): State<AppState>,
    auth: LibraryAuth,
) -> ApiResult<Json<CollectionsResponse>> {
    let (corpus, _) = state
        .corpus_loader
        .load(&auth.identity, &auth.credentials, false)
        .await?;

    let paths: BTreeSet<String> = corpus
        .iter()
        .flat_map(|item| item.collection_paths.iter().cloned())
        .collect();

    Ok(Json(CollectionsResponse {
        success: true,
        collections: paths.into_iter().collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
}

/// POST /api/library/refresh
///
/// Bypass the corpus cache, refetch, and report how many items came back.
pub async fn refresh(
    State(state): State<AppState>,
    auth: LibraryAuth,
) -> ApiResult<Json<RefreshResponse>> {
    let (corpus, _) = state
        .corpus_loader
        .load(&auth.identity, &auth.credentials, true)
        .await?;

    let count = corpus.len();
    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Library refreshed, {} papers loaded", count),
        count,
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/library/clear-cache
///
/// Drop the cached corpus snapshot without refetching.
pub async fn clear_cache(
    State(state): State<AppState>,
    auth: LibraryAuth,
) -> ApiResult<Json<ClearCacheResponse>> {
    let removed = state.corpus_loader.invalidate(&auth.identity).await;
    let message = if removed {
        "Library cache cleared".to_string()
    } else {
        "No library cache to clear".to_string()
    };
    Ok(Json(ClearCacheResponse {
        success: true,
        message,
    }))
}

/// Build library routes
pub fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/api/library/papers", get(papers))
        .route("/api/library/collections", get(collections))
        .route("/api/library/refresh", post(refresh))
        .route("/api/library/clear-cache", post(clear_cache))
}
