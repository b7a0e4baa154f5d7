//! Domain types shared across the service.

pub mod corpus;
pub mod identity;
pub mod paper;

pub use corpus::{Collection, CorpusItem, LibraryItem, UNCATEGORIZED};
pub use identity::{Identity, LibraryCredentials};
pub use paper::{CandidatePaper, RecommendedPaper, ScoredPaper};
