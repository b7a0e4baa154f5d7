//! Service clients and the recommendation pipeline.

pub mod arxiv_client;
pub mod candidate_fetcher;
pub mod code_link;
pub mod corpus_loader;
pub mod recommendation_orchestrator;
pub mod scorer;
pub mod zotero_client;

pub use arxiv_client::{ArxivClient, FeedDocument, FeedEntry, FeedError, FeedService};
pub use candidate_fetcher::CandidateFetcher;
pub use code_link::{CodeLinkError, CodeLinkService, PapersWithCodeClient};
pub use corpus_loader::{CorpusError, CorpusLoader};
pub use recommendation_orchestrator::{RecommendationOrchestrator, RecommendationRequest};
pub use scorer::{Scorer, TfidfScorer};
pub use zotero_client::{LibraryError, LibraryService, ZoteroClient};
