//! paperscope - Personalized arXiv paper recommendations
//!
//! Serves recommendations scored against a user's Zotero reference
//! library. Core pieces:
//! - Identity-scoped on-disk cache for corpus snapshots and finished runs
//! - Batched candidate retrieval from the arXiv feed, tolerant of partial
//!   failures
//! - TF-IDF relevance scoring against the reference corpus
//! - HTTP API with an SSE progress stream per recommendation run

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use cache::CacheStore;
use config::Settings;
use services::{
    ArxivClient, CandidateFetcher, CorpusLoader, FeedService, PapersWithCodeClient,
    RecommendationOrchestrator, Scorer, TfidfScorer, ZoteroClient,
};
use services::code_link::CodeLinkService;
use services::zotero_client::LibraryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Kept for the login probe; everything else goes through the loader.
    pub library: Arc<dyn LibraryService>,
    pub corpus_loader: CorpusLoader,
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State wired to the real upstream services.
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let library: Arc<dyn LibraryService> = Arc::new(ZoteroClient::new()?);
        let feed: Arc<dyn FeedService> = Arc::new(ArxivClient::new(
            settings.feed_retries,
            Duration::from_secs(settings.feed_retry_delay_secs),
        )?);
        let scorer: Arc<dyn Scorer> = Arc::new(TfidfScorer);
        let code_links: Option<Arc<dyn CodeLinkService>> = if settings.fetch_code_links {
            Some(Arc::new(PapersWithCodeClient::new()?))
        } else {
            None
        };
        Ok(Self::with_services(settings, library, feed, scorer, code_links))
    }

    /// State with injectable services. Tests use this to swap in mocks.
    pub fn with_services(
        settings: Settings,
        library: Arc<dyn LibraryService>,
        feed: Arc<dyn FeedService>,
        scorer: Arc<dyn Scorer>,
        code_links: Option<Arc<dyn CodeLinkService>>,
    ) -> Self {
        let cache = CacheStore::new(
            settings.cache_dir.clone(),
            settings.cache_ttl_hours,
            settings.cache_enabled,
        );
        let corpus_loader = CorpusLoader::new(cache.clone(), Arc::clone(&library));
        let fetcher = CandidateFetcher::new(feed, settings.batch_size);
        let orchestrator = Arc::new(RecommendationOrchestrator::new(
            cache,
            corpus_loader.clone(),
            fetcher,
            scorer,
            code_links,
            settings.max_results,
        ));

        Self {
            settings: Arc::new(settings),
            library,
            corpus_loader,
            orchestrator,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::library_routes())
        .merge(api::recommendation_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
