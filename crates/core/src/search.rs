//! SearchClient trait — the abstraction over web search backends.
//!
//! The search tools and the source-filter retry policy both talk to this
//! seam; the HTTP implementation lives in the tools crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// How thorough a search pass should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Standard,
    Deep,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Standard => "standard",
            Depth::Deep => "deep",
        }
    }
}

impl std::str::FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            other => Err(format!("unknown depth '{other}' (expected standard|deep)")),
        }
    }
}

/// A search request with domain filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query text
    pub query: String,

    /// Search depth
    #[serde(default)]
    pub depth: Depth,

    /// Restrict results to these hosts (empty = no restriction)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,

    /// Never return results from these hosts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// One result item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchItem {
    /// The host part of the item URL, with any `www.` prefix stripped.
    pub fn host(&self) -> Option<String> {
        let rest = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))?;
        let host = rest.split(['/', '?', '#']).next()?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        if host.is_empty() {
            None
        } else {
            Some(host.to_ascii_lowercase())
        }
    }
}

/// The core SearchClient trait.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "linkup").
    fn name(&self) -> &str;

    /// Run a search and return result items in relevance order.
    async fn search(
        &self,
        query: SearchQuery,
    ) -> std::result::Result<Vec<SearchItem>, SearchError>;
}
