//! Release index client
//!
//! One GET against the GitHub "latest release" endpoint per call; no
//! internal retry, refreshing is the caller's decision.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;

use super::types::{GitHubRelease, Release};
use crate::error::{ControlError, ControlResult};
use crate::setup::downloader::USER_AGENT;

/// Latest llama.cpp release on GitHub
pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/repos/ggml-org/llama.cpp/releases/latest";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    client: reqwest::Client,
    endpoint: String,
}

impl ReleaseCatalog {
    pub fn new(config: CatalogConfig) -> ControlResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ControlError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }

    /// Fetch and normalize the latest release
    pub async fn fetch_latest_release(&self) -> ControlResult<Release> {
        tracing::debug!("[Catalog] Fetching latest release from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| ControlError::CatalogUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|remaining| remaining.to_str().unwrap_or("1") == "0")
        {
            return Err(ControlError::CatalogUnavailable(
                "GitHub API rate limit exceeded, try again later".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(ControlError::CatalogUnavailable(format!("release index answered {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ControlError::CatalogUnavailable(e.to_string()))?;

        let release = parse_release(&body)?;
        tracing::info!(
            "[Catalog] Latest release {} with {} assets",
            release.version_tag,
            release.assets.len()
        );
        Ok(release)
    }
}

/// Parse a release index payload
pub fn parse_release(body: &str) -> ControlResult<Release> {
    let raw: GitHubRelease =
        serde_json::from_str(body).map_err(|e| ControlError::CatalogParseError(e.to_string()))?;
    Ok(raw.into())
}
