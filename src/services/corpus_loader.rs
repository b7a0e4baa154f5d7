//! Reference corpus loading.
//!
//! Wraps the library service with the corpus cache: a load first consults
//! the identity's cached snapshot, and only on a miss (or forced refresh)
//! fetches collections and items upstream, filters out items without an
//! abstract, resolves collection keys into `Parent/Child` display paths,
//! and writes the snapshot back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheStore, Fingerprint};
use crate::models::{Collection, CorpusItem, Identity, LibraryCredentials};
use crate::services::zotero_client::{LibraryError, LibraryService};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Collection cycle detected at '{0}'")]
    CollectionCycle(String),
}

/// Cached corpus snapshot. Collections ride along as a list so paths can be
/// regrouped without refetching.
#[derive(Debug, Serialize, Deserialize)]
struct CorpusCachePayload {
    corpus: Vec<CorpusItem>,
    collections: Vec<Collection>,
}

/// Loads and caches the reference corpus for an identity.
#[derive(Clone)]
pub struct CorpusLoader {
    cache: CacheStore,
    library: Arc<dyn LibraryService>,
}

impl CorpusLoader {
    pub fn new(cache: CacheStore, library: Arc<dyn LibraryService>) -> Self {
        Self { cache, library }
    }

    /// Load the corpus, from cache when possible.
    ///
    /// Returns the corpus items plus the collection map they were resolved
    /// against. Empty credentials yield an empty corpus rather than an
    /// error.
    pub async fn load(
        &self,
        identity: &Identity,
        credentials: &LibraryCredentials,
        force_refresh: bool,
    ) -> Result<(Vec<CorpusItem>, HashMap<String, Collection>), CorpusError> {
        if credentials.library_id.trim().is_empty() || credentials.api_key.trim().is_empty() {
            return Ok((Vec::new(), HashMap::new()));
        }

        let fingerprint = Fingerprint::corpus(identity);
        if !force_refresh {
            if let Some(envelope) = self
                .cache
                .get::<CorpusCachePayload>(identity, &fingerprint)
                .await
            {
                tracing::info!(
                    count = envelope.payload.corpus.len(),
                    "using cached corpus snapshot"
                );
                return Ok((
                    envelope.payload.corpus,
                    by_key(envelope.payload.collections),
                ));
            }
        }

        tracing::info!(
            library_id = %identity.library_id(),
            force_refresh,
            "fetching reference library"
        );
        let collections = by_key(self.library.list_collections(credentials).await?);
        let items = self.library.list_items(credentials).await?;

        let total = items.len();
        let mut corpus = Vec::new();
        for item in items {
            // Only items with an abstract can be scored against.
            if item.abstract_text.trim().is_empty() {
                continue;
            }
            let mut paths = Vec::new();
            for key in &item.collection_keys {
                match resolve_collection_path(key, &collections)? {
                    Some(path) => paths.push(path),
                    None => tracing::warn!(
                        collection = %key,
                        item = %item.key,
                        "item references an unknown collection, skipping it"
                    ),
                }
            }
            corpus.push(item.into_corpus_item(paths));
        }
        tracing::info!(
            kept = corpus.len(),
            skipped = total - corpus.len(),
            "built reference corpus"
        );

        self.cache
            .put(
                identity,
                &fingerprint,
                CorpusCachePayload {
                    corpus: corpus.clone(),
                    collections: collections.values().cloned().collect(),
                },
            )
            .await;

        Ok((corpus, collections))
    }

    /// Drop the cached snapshot. Returns whether one existed.
    pub async fn invalidate(&self, identity: &Identity) -> bool {
        self.cache
            .invalidate(identity, &Fingerprint::corpus(identity))
            .await
    }
}

fn by_key(collections: Vec<Collection>) -> HashMap<String, Collection> {
    collections
        .into_iter()
        .map(|collection| (collection.key.clone(), collection))
        .collect()
}

/// Resolve a collection key into its `Root/Child/Leaf` display path.
///
/// An unknown key resolves to `None` (the caller decides how loudly to
/// complain). An unknown parent mid-walk terminates the walk, treating the
/// walked prefix as rooted. A parent loop is a hard error.
fn resolve_collection_path(
    key: &str,
    collections: &HashMap<String, Collection>,
) -> Result<Option<String>, CorpusError> {
    if !collections.contains_key(key) {
        return Ok(None);
    }

    let mut names = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = Some(key);
    while let Some(k) = current {
        if !visited.insert(k) {
            return Err(CorpusError::CollectionCycle(k.to_string()));
        }
        match collections.get(k) {
            Some(collection) => {
                names.push(collection.name.as_str());
                current = collection.parent_key.as_deref();
            }
            // Parent key points outside the map; treat what we have as
            // rooted here.
            None => current = None,
        }
    }
    names.reverse();
    Ok(Some(names.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(key: &str, name: &str, parent: Option<&str>) -> Collection {
        Collection {
            key: key.into(),
            name: name.into(),
            parent_key: parent.map(String::from),
        }
    }

    #[test]
    fn test_resolves_nested_path() {
        let collections = by_key(vec![
            collection("A", "AI", None),
            collection("B", "Transformers", Some("A")),
            collection("C", "Attention", Some("B")),
        ]);
        assert_eq!(
            resolve_collection_path("C", &collections).unwrap(),
            Some("AI/Transformers/Attention".to_string())
        );
        assert_eq!(
            resolve_collection_path("A", &collections).unwrap(),
            Some("AI".to_string())
        );
    }

    #[test]
    fn test_unknown_key_resolves_to_none() {
        let collections = by_key(vec![collection("A", "AI", None)]);
        assert_eq!(resolve_collection_path("ZZ", &collections).unwrap(), None);
    }

    #[test]
    fn test_unknown_parent_roots_the_walk() {
        let collections = by_key(vec![collection("B", "Orphan", Some("GONE"))]);
        assert_eq!(
            resolve_collection_path("B", &collections).unwrap(),
            Some("Orphan".to_string())
        );
    }

    #[test]
    fn test_cycle_is_a_hard_error() {
        let collections = by_key(vec![
            collection("A", "One", Some("B")),
            collection("B", "Two", Some("A")),
        ]);
        assert!(matches!(
            resolve_collection_path("A", &collections),
            Err(CorpusError::CollectionCycle(_))
        ));
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let collections = by_key(vec![collection("A", "Selfie", Some("A"))]);
        assert!(matches!(
            resolve_collection_path("A", &collections),
            Err(CorpusError::CollectionCycle(_))
        ));
    }
}
