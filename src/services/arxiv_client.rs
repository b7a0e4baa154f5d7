//! arXiv feed and export API client.
//!
//! Two upstream surfaces, both Atom XML: the category feed at
//! `rss.arxiv.org/atom/{query}` (which carries the per-entry announce type)
//! and the export query API (which serves full paper details for an id
//! list). The export API asks clients to space requests out, so detail
//! queries go through a rate limiter whose interval doubles as the retry
//! backoff.

use std::time::{Duration, Instant};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::CandidatePaper;

const ARXIV_FEED_BASE_URL: &str = "https://rss.arxiv.org/atom";
const ARXIV_EXPORT_API_URL: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = "paperscope/0.1.0 (https://github.com/paperscope/paperscope)";

/// Feed title marker arXiv serves for an unknown category query.
pub const FEED_ERROR_MARKER: &str = "Feed error for query";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid feed query: {0}")]
    InvalidQuery(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed API error {0}: {1}")]
    Api(u16, String),

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

/// A parsed Atom document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// One Atom entry, fields shared by both upstream surfaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    /// Raw entry id, either `oai:arXiv.org:2501.01234` style (category
    /// feed) or an `http://arxiv.org/abs/...` URL (export API).
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    /// `new`, `replace`, `cross`, etc. Only the category feed sets this.
    pub announce_type: Option<String>,
}

/// Access to the candidate paper feed.
#[async_trait::async_trait]
pub trait FeedService: Send + Sync {
    /// Fetch the category feed for a query like `cs.AI+cs.LG`.
    async fn fetch_feed(&self, query: &str) -> Result<FeedDocument, FeedError>;

    /// Fetch full details for a batch of short arXiv ids.
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<CandidatePaper>, FeedError>;
}

struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Client for arXiv's feed and export APIs.
pub struct ArxivClient {
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    retries: u32,
}

impl ArxivClient {
    pub fn new(retries: u32, retry_delay: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;
        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(retry_delay),
            retries,
        })
    }

    async fn query_export(
        &self,
        id_list: &str,
        count: usize,
    ) -> Result<Vec<CandidatePaper>, FeedError> {
        let max_results = count.to_string();
        let response = self
            .client
            .get(ARXIV_EXPORT_API_URL)
            .query(&[("id_list", id_list), ("max_results", &max_results)])
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        let document = parse_atom(&body)?;
        entries_to_candidates(document.entries)
    }
}

#[async_trait::async_trait]
impl FeedService for ArxivClient {
    async fn fetch_feed(&self, query: &str) -> Result<FeedDocument, FeedError> {
        let url = format!("{}/{}", ARXIV_FEED_BASE_URL, query);
        tracing::info!(%url, "fetching arXiv category feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        let document = parse_atom(&body)?;
        tracing::info!(entries = document.entries.len(), "parsed category feed");
        Ok(document)
    }

    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<CandidatePaper>, FeedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids.join(",");
        let mut attempt = 0;
        loop {
            self.rate_limiter.wait().await;
            match self.query_export(&id_list, ids.len()).await {
                Ok(papers) => return Ok(papers),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "detail fetch failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Strip a trailing `vN` version suffix from a short arXiv id.
pub(crate) fn strip_version(id: &str) -> &str {
    if let Some(pos) = id.rfind('v') {
        let suffix = &id[pos + 1..];
        if pos > 0 && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return &id[..pos];
        }
    }
    id
}

fn entries_to_candidates(entries: Vec<FeedEntry>) -> Result<Vec<CandidatePaper>, FeedError> {
    let mut papers = Vec::with_capacity(entries.len());
    for entry in entries {
        // The export API reports a bad id list as an error entry rather
        // than an HTTP error.
        if entry.id.contains("/api/errors") {
            return Err(FeedError::Parse(format!(
                "export API returned an error entry: {}",
                entry.summary
            )));
        }
        let short_id = entry.id.rsplit('/').next().unwrap_or(&entry.id);
        let id = strip_version(short_id).to_string();
        let pdf_url = entry
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", id));
        papers.push(CandidatePaper {
            id,
            title: normalize_whitespace(&entry.title),
            authors: entry.authors,
            abstract_text: entry.summary.trim().to_string(),
            pdf_url,
            published_date: entry.published,
        });
    }
    Ok(papers)
}

/// Collapse runs of whitespace (Atom titles wrap with indentation).
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an Atom document from either upstream surface.
///
/// Namespace prefixes are ignored, so `arxiv:announce_type` is matched by
/// its local name.
pub fn parse_atom(xml: &str) -> Result<FeedDocument, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut document = FeedDocument::default();
    let mut entry: Option<FeedEntry> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Err(e) => return Err(FeedError::Parse(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let name = local_name(&start);
                if name == "entry" {
                    entry = Some(FeedEntry::default());
                } else if name == "link" {
                    if let Some(current) = entry.as_mut() {
                        capture_pdf_link(&start, current);
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(start)) => {
                if local_name(&start) == "link" {
                    if let Some(current) = entry.as_mut() {
                        capture_pdf_link(&start, current);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(finished) = entry.take() {
                        document.entries.push(finished);
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| FeedError::Parse(e.to_string()))?
                    .into_owned();
                record_text(&path, &mut document, entry.as_mut(), &value);
            }
            Ok(Event::CData(cdata)) => {
                let value = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                record_text(&path, &mut document, entry.as_mut(), &value);
            }
            Ok(_) => {}
        }
    }

    Ok(document)
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn record_text(
    path: &[String],
    document: &mut FeedDocument,
    entry: Option<&mut FeedEntry>,
    value: &str,
) {
    if path_is(path, &["feed", "title"]) {
        document.title.push_str(value);
        return;
    }
    let Some(entry) = entry else {
        return;
    };
    if path_is(path, &["entry", "id"]) {
        entry.id.push_str(value);
    } else if path_is(path, &["entry", "title"]) {
        entry.title.push_str(value);
    } else if path_is(path, &["entry", "summary"]) {
        entry.summary.push_str(value);
    } else if path_is(path, &["entry", "published"]) {
        entry.published.push_str(value);
    } else if path_is(path, &["entry", "announce_type"]) {
        entry.announce_type = Some(value.to_string());
    } else if path_is(path, &["entry", "author", "name"]) {
        entry.authors.push(value.to_string());
    }
}

fn path_is(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn capture_pdf_link(start: &BytesStart<'_>, entry: &mut FeedEntry) {
    let mut href = None;
    let mut is_pdf = false;
    for attr in start.attributes().flatten() {
        let key = attr.key.local_name();
        if let Ok(value) = attr.unescape_value() {
            match key.as_ref() {
                b"href" => href = Some(value.into_owned()),
                b"title" if value == "pdf" => is_pdf = true,
                _ => {}
            }
        }
    }
    if is_pdf {
        entry.pdf_url = href;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>cs.AI updates on arXiv.org</title>
  <entry>
    <id>oai:arXiv.org:2501.01234v1</id>
    <title>A Fresh Result</title>
    <summary>Something genuinely new.</summary>
    <arxiv:announce_type>new</arxiv:announce_type>
  </entry>
  <entry>
    <id>oai:arXiv.org:2412.09999v3</id>
    <title>A Revision</title>
    <summary>Same paper, new version.</summary>
    <arxiv:announce_type>replace</arxiv:announce_type>
  </entry>
</feed>"#;

    const EXPORT_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: id_list=2501.01234</title>
  <entry>
    <id>http://arxiv.org/abs/2501.01234v2</id>
    <published>2025-01-03T12:00:00Z</published>
    <title>A Fresh
      Result</title>
    <summary>  Something genuinely new.
</summary>
    <author><name>Jane Doe</name></author>
    <author><name>John Smith</name></author>
    <link href="http://arxiv.org/abs/2501.01234v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2501.01234v2" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_category_feed() {
        let doc = parse_atom(CATEGORY_FEED).unwrap();
        assert_eq!(doc.title, "cs.AI updates on arXiv.org");
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[0].id, "oai:arXiv.org:2501.01234v1");
        assert_eq!(doc.entries[0].announce_type.as_deref(), Some("new"));
        assert_eq!(doc.entries[1].announce_type.as_deref(), Some("replace"));
    }

    #[test]
    fn test_parse_export_feed() {
        let doc = parse_atom(EXPORT_FEED).unwrap();
        assert_eq!(doc.entries.len(), 1);
        let entry = &doc.entries[0];
        assert_eq!(entry.id, "http://arxiv.org/abs/2501.01234v2");
        assert_eq!(entry.authors, vec!["Jane Doe", "John Smith"]);
        assert_eq!(
            entry.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2501.01234v2")
        );
        assert_eq!(entry.published, "2025-01-03T12:00:00Z");
    }

    #[test]
    fn test_export_entries_become_candidates() {
        let doc = parse_atom(EXPORT_FEED).unwrap();
        let papers = entries_to_candidates(doc.entries).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "2501.01234");
        assert_eq!(papers[0].title, "A Fresh Result");
        assert_eq!(papers[0].abstract_text, "Something genuinely new.");
        assert_eq!(papers[0].pdf_url, "http://arxiv.org/pdf/2501.01234v2");
    }

    #[test]
    fn test_error_entry_is_rejected() {
        let entries = vec![FeedEntry {
            id: "http://arxiv.org/api/errors#foo".into(),
            summary: "malformed id".into(),
            ..Default::default()
        }];
        assert!(matches!(
            entries_to_candidates(entries),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_pdf_link_gets_a_constructed_url() {
        let entries = vec![FeedEntry {
            id: "http://arxiv.org/abs/2501.01234v1".into(),
            title: "T".into(),
            ..Default::default()
        }];
        let papers = entries_to_candidates(entries).unwrap();
        assert_eq!(papers[0].pdf_url, "https://arxiv.org/pdf/2501.01234");
    }

    #[test]
    fn test_malformed_xml_is_a_parse_error() {
        assert!(matches!(
            parse_atom("<feed><title>oops"),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("2501.01234v1"), "2501.01234");
        assert_eq!(strip_version("2501.01234v12"), "2501.01234");
        assert_eq!(strip_version("2501.01234"), "2501.01234");
        // Old-style ids and stray v's stay intact.
        assert_eq!(strip_version("cs/0112017"), "cs/0112017");
        assert_eq!(strip_version("v1"), "v1");
        assert_eq!(strip_version("1234.5678va"), "1234.5678va");
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_client_creation() {
        assert!(ArxivClient::new(3, Duration::from_secs(1)).is_ok());
    }
}
