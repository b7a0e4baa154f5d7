//! HTTP API integration tests.
//!
//! Builds the full router over scripted library and feed services and
//! drives it with in-process requests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use paperscope::api::auth::{LIBRARY_ID_HEADER, LIBRARY_KEY_HEADER};
use paperscope::config::Settings;
use paperscope::models::{CandidatePaper, Collection, LibraryCredentials, LibraryItem};
use paperscope::services::arxiv_client::{FeedDocument, FeedEntry, FeedError, FeedService};
use paperscope::services::zotero_client::{LibraryError, LibraryService};
use paperscope::services::TfidfScorer;
use paperscope::{build_router, AppState};

struct MockLibrary {
    collections: Vec<Collection>,
    items: Vec<LibraryItem>,
    reject_with_forbidden: bool,
}

#[async_trait::async_trait]
impl LibraryService for MockLibrary {
    async fn verify_credentials(
        &self,
        _credentials: &LibraryCredentials,
    ) -> Result<(), LibraryError> {
        if self.reject_with_forbidden {
            return Err(LibraryError::Forbidden);
        }
        Ok(())
    }

    async fn list_collections(
        &self,
        _credentials: &LibraryCredentials,
    ) -> Result<Vec<Collection>, LibraryError> {
        Ok(self.collections.clone())
    }

    async fn list_items(
        &self,
        _credentials: &LibraryCredentials,
    ) -> Result<Vec<LibraryItem>, LibraryError> {
        Ok(self.items.clone())
    }
}

struct MockFeed {
    document: FeedDocument,
    fail_details: bool,
}

#[async_trait::async_trait]
impl FeedService for MockFeed {
    async fn fetch_feed(&self, _query: &str) -> Result<FeedDocument, FeedError> {
        Ok(self.document.clone())
    }

    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<CandidatePaper>, FeedError> {
        if self.fail_details {
            return Err(FeedError::Network("scripted detail failure".into()));
        }
        Ok(ids
            .iter()
            .map(|id| CandidatePaper {
                id: id.clone(),
                title: format!("Paper {}", id),
                authors: vec!["Candidate Author".into()],
                abstract_text: "Neural networks and where to find them.".into(),
                pdf_url: format!("https://arxiv.org/pdf/{}", id),
                published_date: "2025-01-03T12:00:00Z".into(),
            })
            .collect())
    }
}

fn library_item(key: &str, abstract_text: &str, collection_keys: Vec<String>) -> LibraryItem {
    LibraryItem {
        key: key.into(),
        title: format!("Reference {}", key),
        authors: vec!["Reference Author".into()],
        abstract_text: abstract_text.into(),
        date: "2024".into(),
        date_added: "2024-06-01T00:00:00Z".into(),
        url: String::new(),
        item_type: "journalArticle".into(),
        collection_keys,
    }
}

fn default_library() -> MockLibrary {
    MockLibrary {
        collections: vec![Collection {
            key: "COLA".into(),
            name: "AI".into(),
            parent_key: None,
        }],
        items: vec![
            library_item(
                "K1",
                "Graph neural networks for molecules",
                vec!["COLA".into()],
            ),
            // No collection membership, lands under Uncategorized.
            library_item("K2", "Transformers for language modeling", Vec::new()),
        ],
        reject_with_forbidden: false,
    }
}

fn default_feed() -> MockFeed {
    MockFeed {
        document: FeedDocument {
            title: "cs.AI updates on arXiv.org".into(),
            entries: (1..=3)
                .map(|n| FeedEntry {
                    id: format!("oai:arXiv.org:2501.{:05}v1", n),
                    announce_type: Some("new".into()),
                    ..Default::default()
                })
                .collect(),
        },
        fail_details: false,
    }
}

struct TestApp {
    app: Router,
    _cache_dir: tempfile::TempDir,
}

fn create_test_app(library: MockLibrary, feed: MockFeed) -> TestApp {
    let cache_dir = tempfile::tempdir().expect("failed to create temp cache dir");
    let settings = Settings {
        cache_dir: cache_dir.path().to_path_buf(),
        ..Settings::default()
    };
    let state = AppState::with_services(
        settings,
        Arc::new(library),
        Arc::new(feed),
        Arc::new(TfidfScorer::default()),
        None,
    );
    TestApp {
        app: build_router(state),
        _cache_dir: cache_dir,
    }
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(LIBRARY_ID_HEADER, "12345")
        .header(LIBRARY_KEY_HEADER, "abcdefghijklmnop")
        .body(Body::empty())
        .unwrap()
}

fn authed_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(LIBRARY_ID_HEADER, "12345")
        .header(LIBRARY_KEY_HEADER, "abcdefghijklmnop")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "paperscope");
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/library/papers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["message"], "library credentials required");
}

#[tokio::test]
async fn test_blank_credential_headers_are_rejected() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/library/papers")
                .header(LIBRARY_ID_HEADER, "   ")
                .header(LIBRARY_KEY_HEADER, "abcdefghijklmnop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_returns_derived_identity() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"library_id": "12345", "api_key": "abcdefghijklmnop"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["library_id"], "12345");
    let user_id = body["user_id"].as_str().unwrap();
    assert_eq!(user_id.len(), 64);
    assert!(user_id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_login_rejects_bad_key() {
    let mut library = default_library();
    library.reject_with_forbidden = true;
    let test = create_test_app(library, default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"library_id": "12345", "api_key": "wrong"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(
        body["error"]["message"],
        "invalid API key or insufficient permissions"
    );
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"library_id": "12345", "api_key": "  "}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_papers_are_grouped_by_collection() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(authed_get("/api/library/papers"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 2);
    assert_eq!(body["papers"].as_array().unwrap().len(), 2);

    let grouped = body["papersByCollection"].as_object().unwrap();
    assert_eq!(grouped["AI"].as_array().unwrap().len(), 1);
    assert_eq!(grouped["AI"][0]["key"], "K1");
    assert_eq!(grouped["Uncategorized"][0]["key"], "K2");
}

#[tokio::test]
async fn test_collections_listing() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(authed_get("/api/library/collections"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["collections"], json!(["AI", "Uncategorized"]));
}

#[tokio::test]
async fn test_refresh_reloads_the_library() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(authed_post("/api/library/refresh"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["message"], "Library refreshed, 2 papers loaded");
}

#[tokio::test]
async fn test_clear_cache_reports_whether_anything_was_cleared() {
    let test = create_test_app(default_library(), default_feed());

    // Nothing cached yet.
    let response = test
        .app
        .clone()
        .oneshot(authed_post("/api/library/clear-cache"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["message"], "No library cache to clear");

    // Populate the corpus cache, then clear it.
    test.app
        .clone()
        .oneshot(authed_get("/api/library/papers"))
        .await
        .unwrap();
    let response = test
        .app
        .oneshot(authed_post("/api/library/clear-cache"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["message"], "Library cache cleared");
}

#[tokio::test]
async fn test_recommendations_endpoint_returns_papers() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(authed_get("/api/recommendations?arxiv_query=cs.AI"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 3);
    assert_eq!(body["cached"], false);
    assert_eq!(body["reference_count"], 2);

    let papers = body["papers"].as_array().unwrap();
    assert_eq!(papers.len(), 3);
    for paper in papers {
        assert!(paper["arxiv_id"].as_str().unwrap().starts_with("2501."));
        assert!(paper["pdf_url"].as_str().unwrap().contains("arxiv.org"));
        assert!(paper["score"].is_number());
    }
}

#[tokio::test]
async fn test_recommendations_second_call_is_cached() {
    let test = create_test_app(default_library(), default_feed());

    test.app
        .clone()
        .oneshot(authed_get("/api/recommendations"))
        .await
        .unwrap();
    let response = test
        .app
        .oneshot(authed_get("/api/recommendations"))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn test_recommendations_with_empty_library() {
    let library = MockLibrary {
        collections: Vec::new(),
        items: Vec::new(),
        reject_with_forbidden: false,
    };
    let test = create_test_app(library, default_feed());

    let response = test
        .app
        .oneshot(authed_get("/api/recommendations"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["papers"], json!([]));
    assert!(body["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_recommendations_failure_maps_to_server_error() {
    let mut feed = default_feed();
    feed.fail_details = true;
    let test = create_test_app(default_library(), feed);

    let response = test
        .app
        .oneshot(authed_get("/api/recommendations"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_recommendations_stream_emits_progress_then_terminal() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(authed_get("/api/recommendations/stream?arxiv_query=cs.AI"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    // The stream closes itself after the terminal frame, so the whole body
    // can be collected.
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let frames: Vec<Value> = text
        .split("\n\n")
        .filter_map(|chunk| chunk.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert!(frames.len() >= 2, "expected progress and terminal frames");

    let (progress_frames, terminal_frames): (Vec<&Value>, Vec<&Value>) = frames
        .iter()
        .partition(|frame| frame.get("success").is_none());
    assert_eq!(terminal_frames.len(), 1, "expected exactly one terminal frame");
    assert!(
        frames.last().unwrap().get("success").is_some(),
        "terminal frame must be last"
    );

    assert!(progress_frames
        .iter()
        .any(|frame| frame["message"].as_str().unwrap().contains("reference library")));
    let terminal = terminal_frames[0];
    assert_eq!(terminal["success"], true);
    assert_eq!(terminal["total"], 3);
    assert_eq!(terminal["papers"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_recommendations_stream_reports_failures_in_band() {
    let mut feed = default_feed();
    feed.fail_details = true;
    let test = create_test_app(default_library(), feed);

    let response = test
        .app
        .oneshot(authed_get("/api/recommendations/stream"))
        .await
        .unwrap();

    // Errors surface inside the stream, not as an HTTP status.
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let terminal: Value = text
        .split("\n\n")
        .filter_map(|chunk| chunk.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .find(|frame: &Value| frame.get("success").is_some())
        .expect("stream should carry a terminal frame");
    assert_eq!(terminal["success"], false);
    assert!(terminal["error"]
        .as_str()
        .unwrap()
        .contains("candidate papers"));
}

#[tokio::test]
async fn test_stream_requires_credentials() {
    let test = create_test_app(default_library(), default_feed());

    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/recommendations/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
