//! Linkup-backed search client.
//!
//! Implements `stringer_core::SearchClient` against the Linkup `/search`
//! endpoint. The search tools and the source-filter policy only see the
//! trait, so tests swap in static clients.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use stringer_core::error::SearchError;
use stringer_core::search::{SearchClient, SearchItem, SearchQuery};

/// HTTP search client for the Linkup API.
pub struct LinkupClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl LinkupClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| SearchError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl SearchClient for LinkupClient {
    fn name(&self) -> &str {
        "linkup"
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchItem>, SearchError> {
        let url = format!("{}/search", self.base_url);

        let mut body = serde_json::json!({
            "q": query.query,
            "depth": query.depth.as_str(),
            "outputType": "searchResults",
            "includeImages": false,
        });
        if !query.include_domains.is_empty() {
            body["includeDomains"] = serde_json::json!(query.include_domains);
        }
        if !query.exclude_domains.is_empty() {
            body["excludeDomains"] = serde_json::json!(query.exclude_domains);
        }

        debug!(depth = query.depth.as_str(), "Sending search request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Search backend returned error");
            return Err(SearchError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiSearchResponse =
            response.json().await.map_err(|e| SearchError::ApiError {
                status_code: 200,
                message: format!("Failed to parse search response: {e}"),
            })?;

        Ok(api_response
            .results
            .into_iter()
            .map(|r| SearchItem {
                title: r.name,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}

// --- Linkup API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    results: Vec<ApiSearchResult>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResult {
    #[serde(default)]
    name: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_normalizes_base_url() {
        let client = LinkupClient::new("https://api.linkup.so/v1/", "lk-test").unwrap();
        assert_eq!(client.base_url, "https://api.linkup.so/v1");
        assert_eq!(client.name(), "linkup");
    }

    #[test]
    fn parse_search_response() {
        let data = r#"{
            "results": [
                {"type": "text", "name": "Dinamalar", "url": "https://www.dinamalar.com/", "content": "தமிழ் செய்திகள்"},
                {"type": "text", "name": "The Hindu", "url": "https://www.thehindu.com/", "content": "Chennai news"}
            ]
        }"#;
        let parsed: ApiSearchResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].name, "Dinamalar");
        assert_eq!(parsed.results[1].url, "https://www.thehindu.com/");
    }

    #[test]
    fn parse_empty_response() {
        let parsed: ApiSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn parse_response_with_missing_optional_fields() {
        let data = r#"{"results": [{"url": "https://example.in/story"}]}"#;
        let parsed: ApiSearchResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.results[0].url, "https://example.in/story");
        assert!(parsed.results[0].name.is_empty());
    }
}
