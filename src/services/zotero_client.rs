//! Zotero Web API client.
//!
//! Implements [`LibraryService`] against api.zotero.org v3. Collections and
//! items are fetched with paginated listing requests and normalized into the
//! domain types; raw wire shapes never leave this module.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Collection, LibraryCredentials, LibraryItem};

const ZOTERO_BASE_URL: &str = "https://api.zotero.org";
const ZOTERO_API_VERSION: &str = "3";
const USER_AGENT: &str = "paperscope/0.1.0 (https://github.com/paperscope/paperscope)";
const PAGE_LIMIT: usize = 100;

/// Server-side filter for the item types that can carry an abstract worth
/// scoring against.
const ITEM_TYPE_FILTER: &str = "conferencePaper || journalArticle || preprint";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API key or insufficient permissions")]
    Forbidden,

    #[error("Library not found")]
    NotFound,

    #[error("Library API error {0}: {1}")]
    Api(u16, String),

    #[error("Failed to parse library response: {0}")]
    Parse(String),
}

/// Read access to a user's reference library.
#[async_trait::async_trait]
pub trait LibraryService: Send + Sync {
    /// Cheap credential probe. `Ok(())` means the credentials can read the
    /// library.
    async fn verify_credentials(&self, credentials: &LibraryCredentials)
        -> Result<(), LibraryError>;

    /// All collections in the library.
    async fn list_collections(
        &self,
        credentials: &LibraryCredentials,
    ) -> Result<Vec<Collection>, LibraryError>;

    /// All items of the supported scholarly types, abstracts included.
    async fn list_items(
        &self,
        credentials: &LibraryCredentials,
    ) -> Result<Vec<LibraryItem>, LibraryError>;
}

// Wire shapes. Zotero wraps everything in a versioned envelope with the
// useful fields under `data`.

#[derive(Debug, Deserialize)]
struct ZoteroCollection {
    key: String,
    data: ZoteroCollectionData,
}

#[derive(Debug, Deserialize)]
struct ZoteroCollectionData {
    #[serde(default)]
    name: String,
    #[serde(rename = "parentCollection", default)]
    parent_collection: Option<ParentField>,
}

/// `parentCollection` is the literal `false` for root collections and a key
/// string otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParentField {
    Key(String),
    Flag(bool),
}

#[derive(Debug, Deserialize)]
struct ZoteroItem {
    key: String,
    data: ZoteroItemData,
}

#[derive(Debug, Deserialize)]
struct ZoteroItemData {
    title: Option<String>,
    #[serde(rename = "abstractNote", default)]
    abstract_note: String,
    #[serde(default)]
    creators: Vec<ZoteroCreator>,
    #[serde(default)]
    date: String,
    #[serde(rename = "dateAdded", default)]
    date_added: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "itemType", default)]
    item_type: String,
    #[serde(default)]
    collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ZoteroCreator {
    #[serde(rename = "firstName")]
    first_name: Option<String>,
    #[serde(rename = "lastName")]
    last_name: Option<String>,
    /// Single-field creators (institutions, some imports).
    name: Option<String>,
}

/// Client for the Zotero Web API.
pub struct ZoteroClient {
    client: reqwest::Client,
}

impl ZoteroClient {
    pub fn new() -> Result<Self, LibraryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LibraryError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// One listing page. `extra` carries endpoint-specific query params.
    async fn fetch_page<T: serde::de::DeserializeOwned>(
        &self,
        credentials: &LibraryCredentials,
        resource: &str,
        start: usize,
        limit: usize,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, LibraryError> {
        let url = format!(
            "{}/users/{}/{}",
            ZOTERO_BASE_URL, credentials.library_id, resource
        );
        let params = listing_params(start, limit, extra);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header("Zotero-API-Key", &credentials.api_key)
            .header("Zotero-API-Version", ZOTERO_API_VERSION)
            .send()
            .await
            .map_err(|e| LibraryError::Network(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            403 => return Err(LibraryError::Forbidden),
            404 => return Err(LibraryError::NotFound),
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(LibraryError::Api(status.as_u16(), body));
            }
            _ => {}
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| LibraryError::Parse(e.to_string()))
    }

    /// Follow pagination until a short page.
    async fn fetch_all<T: serde::de::DeserializeOwned>(
        &self,
        credentials: &LibraryCredentials,
        resource: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, LibraryError> {
        let mut all = Vec::new();
        let mut start = 0;
        loop {
            let page: Vec<T> = self
                .fetch_page(credentials, resource, start, PAGE_LIMIT, extra)
                .await?;
            let count = page.len();
            tracing::debug!(resource, start, count, "fetched library page");
            all.extend(page);
            if count < PAGE_LIMIT {
                break;
            }
            start += count;
        }
        Ok(all)
    }
}

#[async_trait::async_trait]
impl LibraryService for ZoteroClient {
    async fn verify_credentials(
        &self,
        credentials: &LibraryCredentials,
    ) -> Result<(), LibraryError> {
        // A one-row collections listing is the cheapest authenticated read.
        self.fetch_page::<ZoteroCollection>(credentials, "collections", 0, 1, &[])
            .await?;
        Ok(())
    }

    async fn list_collections(
        &self,
        credentials: &LibraryCredentials,
    ) -> Result<Vec<Collection>, LibraryError> {
        let raw: Vec<ZoteroCollection> = self
            .fetch_all(credentials, "collections", &[])
            .await?;
        let collections = raw.into_iter().map(normalize_collection).collect::<Vec<_>>();
        tracing::info!(count = collections.len(), "fetched library collections");
        Ok(collections)
    }

    async fn list_items(
        &self,
        credentials: &LibraryCredentials,
    ) -> Result<Vec<LibraryItem>, LibraryError> {
        let raw: Vec<ZoteroItem> = self
            .fetch_all(credentials, "items", &[("itemType", ITEM_TYPE_FILTER)])
            .await?;
        let items = raw.into_iter().map(normalize_item).collect::<Vec<_>>();
        tracing::info!(count = items.len(), "fetched library items");
        Ok(items)
    }
}

/// Query parameters for one listing page.
fn listing_params(start: usize, limit: usize, extra: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut params = vec![
        ("format".to_string(), "json".to_string()),
        ("limit".to_string(), limit.to_string()),
        ("start".to_string(), start.to_string()),
    ];
    params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    params
}

fn normalize_collection(raw: ZoteroCollection) -> Collection {
    let parent_key = match raw.data.parent_collection {
        Some(ParentField::Key(key)) => Some(key),
        _ => None,
    };
    Collection {
        key: raw.key,
        name: raw.data.name,
        parent_key,
    }
}

fn normalize_item(raw: ZoteroItem) -> LibraryItem {
    let authors = display_authors(&raw.data.creators);
    LibraryItem {
        key: raw.key,
        title: raw
            .data
            .title
            .unwrap_or_else(|| "Untitled".to_string()),
        authors,
        abstract_text: raw.data.abstract_note,
        date: raw.data.date,
        date_added: raw.data.date_added,
        url: raw.data.url,
        item_type: raw.data.item_type,
        collection_keys: raw.data.collections,
    }
}

/// Creator records to display names. Falls back to `Unknown` when nothing
/// usable is present.
fn display_authors(creators: &[ZoteroCreator]) -> Vec<String> {
    let mut authors = Vec::new();
    for creator in creators {
        let named = format!(
            "{} {}",
            creator.first_name.as_deref().unwrap_or(""),
            creator.last_name.as_deref().unwrap_or("")
        );
        let named = named.trim();
        if !named.is_empty() {
            authors.push(named.to_string());
        } else if let Some(name) = creator.name.as_deref() {
            if !name.trim().is_empty() {
                authors.push(name.trim().to_string());
            }
        }
    }
    if authors.is_empty() {
        authors.push("Unknown".to_string());
    }
    authors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_collection_false_means_root() {
        let raw: ZoteroCollection = serde_json::from_value(serde_json::json!({
            "key": "COL1",
            "data": {"name": "AI", "parentCollection": false}
        }))
        .unwrap();
        let collection = normalize_collection(raw);
        assert_eq!(collection.name, "AI");
        assert!(collection.parent_key.is_none());
    }

    #[test]
    fn test_parent_collection_key_is_kept() {
        let raw: ZoteroCollection = serde_json::from_value(serde_json::json!({
            "key": "COL2",
            "data": {"name": "Transformers", "parentCollection": "COL1"}
        }))
        .unwrap();
        let collection = normalize_collection(raw);
        assert_eq!(collection.parent_key.as_deref(), Some("COL1"));
    }

    #[test]
    fn test_item_normalization() {
        let raw: ZoteroItem = serde_json::from_value(serde_json::json!({
            "key": "ITEM1",
            "data": {
                "title": "Attention Is All You Need",
                "abstractNote": "The dominant sequence transduction models...",
                "creators": [
                    {"creatorType": "author", "firstName": "Ashish", "lastName": "Vaswani"},
                    {"creatorType": "author", "name": "Google Brain"}
                ],
                "date": "2017",
                "dateAdded": "2024-01-02T03:04:05Z",
                "url": "https://example.org",
                "itemType": "conferencePaper",
                "collections": ["COL1", "COL2"]
            }
        }))
        .unwrap();

        let item = normalize_item(raw);
        assert_eq!(item.title, "Attention Is All You Need");
        assert_eq!(item.authors, vec!["Ashish Vaswani", "Google Brain"]);
        assert_eq!(item.collection_keys, vec!["COL1", "COL2"]);
    }

    #[test]
    fn test_missing_title_defaults_to_untitled() {
        let raw: ZoteroItem = serde_json::from_value(serde_json::json!({
            "key": "ITEM2",
            "data": {"itemType": "preprint"}
        }))
        .unwrap();
        let item = normalize_item(raw);
        assert_eq!(item.title, "Untitled");
        assert_eq!(item.authors, vec!["Unknown"]);
        assert!(item.abstract_text.is_empty());
    }

    #[test]
    fn test_blank_creators_fall_back_to_unknown() {
        let creators = vec![ZoteroCreator {
            first_name: Some("  ".into()),
            last_name: Some(" ".into()),
            name: None,
        }];
        assert_eq!(display_authors(&creators), vec!["Unknown"]);
    }

    #[test]
    fn test_listing_params_respect_the_requested_limit() {
        let params = listing_params(0, 1, &[]);
        assert!(params.contains(&("limit".to_string(), "1".to_string())));
        assert!(params.contains(&("start".to_string(), "0".to_string())));
        assert!(params.contains(&("format".to_string(), "json".to_string())));
    }

    #[test]
    fn test_listing_params_carry_extra_filters() {
        let params = listing_params(200, PAGE_LIMIT, &[("itemType", ITEM_TYPE_FILTER)]);
        assert!(params.contains(&("start".to_string(), "200".to_string())));
        assert!(params.contains(&("limit".to_string(), "100".to_string())));
        assert!(params.contains(&("itemType".to_string(), ITEM_TYPE_FILTER.to_string())));
    }

    #[test]
    fn test_client_creation() {
        assert!(ZoteroClient::new().is_ok());
    }
}
