//! Reference library types: collections and corpus items.

use serde::{Deserialize, Serialize};

/// Collection path assigned to items that belong to no collection.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A library collection (folder) with an optional parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub key: String,
    pub name: String,
    pub parent_key: Option<String>,
}

/// A library item as returned by the library service, before collection
/// keys are resolved into display paths.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryItem {
    pub key: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub date: String,
    pub date_added: String,
    pub url: String,
    pub item_type: String,
    pub collection_keys: Vec<String>,
}

impl LibraryItem {
    /// Attach resolved collection paths, producing the cacheable corpus form.
    ///
    /// Items with no resolved path land under [`UNCATEGORIZED`].
    pub fn into_corpus_item(self, mut collection_paths: Vec<String>) -> CorpusItem {
        if collection_paths.is_empty() {
            collection_paths.push(UNCATEGORIZED.to_string());
        }
        CorpusItem {
            key: self.key,
            title: self.title,
            authors: self.authors,
            abstract_text: self.abstract_text,
            date: self.date,
            date_added: self.date_added,
            collection_paths,
            url: self.url,
            item_type: self.item_type,
        }
    }
}

/// A reference paper with a non-blank abstract, as cached and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub key: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub date: String,
    #[serde(rename = "dateAdded")]
    pub date_added: String,
    #[serde(rename = "collections")]
    pub collection_paths: Vec<String>,
    pub url: String,
    #[serde(rename = "itemType")]
    pub item_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> LibraryItem {
        LibraryItem {
            key: "ITEM1".into(),
            title: "Attention Is All You Need".into(),
            authors: vec!["Ashish Vaswani".into()],
            abstract_text: "The dominant sequence transduction models...".into(),
            date: "2017".into(),
            date_added: "2024-01-02T03:04:05Z".into(),
            url: "https://example.org/attention".into(),
            item_type: "journalArticle".into(),
            collection_keys: vec!["COL1".into()],
        }
    }

    #[test]
    fn test_into_corpus_item_keeps_paths() {
        let corpus = item().into_corpus_item(vec!["AI/Transformers".into()]);
        assert_eq!(corpus.collection_paths, vec!["AI/Transformers"]);
        assert_eq!(corpus.key, "ITEM1");
    }

    #[test]
    fn test_into_corpus_item_defaults_to_uncategorized() {
        let corpus = item().into_corpus_item(Vec::new());
        assert_eq!(corpus.collection_paths, vec![UNCATEGORIZED]);
    }

    #[test]
    fn test_corpus_item_wire_field_names() {
        let json = serde_json::to_value(item().into_corpus_item(vec!["AI".into()])).unwrap();
        assert!(json.get("abstract").is_some());
        assert!(json.get("dateAdded").is_some());
        assert!(json.get("itemType").is_some());
        assert!(json.get("collections").is_some());
        assert!(json.get("abstract_text").is_none());
    }
}
