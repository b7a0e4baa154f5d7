//! Code repository lookup for recommended papers.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const PWC_BASE_URL: &str = "https://paperswithcode.com/api/v1";
const USER_AGENT: &str = "paperscope/0.1.0 (https://github.com/paperscope/paperscope)";

#[derive(Debug, Error)]
pub enum CodeLinkError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Code link API error {0}: {1}")]
    Api(u16, String),

    #[error("Failed to parse code link response: {0}")]
    Parse(String),
}

/// Best-effort lookup of a code repository for a paper.
#[async_trait::async_trait]
pub trait CodeLinkService: Send + Sync {
    /// Repository URL for a short arXiv id, `None` when nothing is indexed.
    async fn find_code_url(&self, paper_id: &str) -> Result<Option<String>, CodeLinkError>;
}

#[derive(Debug, Deserialize)]
struct RepositoriesResponse {
    #[serde(default)]
    results: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    url: String,
    #[serde(default)]
    is_official: bool,
}

/// Client for the Papers with Code API.
pub struct PapersWithCodeClient {
    client: reqwest::Client,
}

impl PapersWithCodeClient {
    pub fn new() -> Result<Self, CodeLinkError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CodeLinkError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl CodeLinkService for PapersWithCodeClient {
    async fn find_code_url(&self, paper_id: &str) -> Result<Option<String>, CodeLinkError> {
        let url = format!("{}/papers/{}/repositories/", PWC_BASE_URL, paper_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CodeLinkError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CodeLinkError::Api(status.as_u16(), body));
        }

        let parsed: RepositoriesResponse = response
            .json()
            .await
            .map_err(|e| CodeLinkError::Parse(e.to_string()))?;
        Ok(choose_repository(&parsed.results).map(|repo| repo.url.clone()))
    }
}

/// Prefer the official repository, else the first listed.
fn choose_repository(results: &[Repository]) -> Option<&Repository> {
    results
        .iter()
        .find(|repo| repo.is_official)
        .or_else(|| results.first())
}
