//! Web search tool — general queries with native-language biasing.
//!
//! When a non-English native language is given, the query is biased toward
//! local-language sources and English sources are excluded, matching the
//! behavior of the local-source tools.

use async_trait::async_trait;
use std::sync::Arc;

use stringer_core::error::ToolError;
use stringer_core::search::{Depth, SearchClient, SearchQuery};
use stringer_core::tool::Tool;

use crate::lang;

pub struct WebSearchTool {
    client: Arc<dyn SearchClient>,
    default_depth: Depth,
}

impl WebSearchTool {
    pub fn new(client: Arc<dyn SearchClient>, default_depth: Depth) -> Self {
        Self {
            client,
            default_depth,
        }
    }
}

/// Read an optional string-array argument.
pub(crate) fn string_array(arguments: &serde_json::Value, key: &str) -> Vec<String> {
    arguments[key]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns relevant sources with titles, URLs, and \
         snippets. When native_language is set to a non-English language, only sources in \
         that language are preferred and English sources are excluded."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "depth": {
                    "type": "string",
                    "enum": ["standard", "deep"],
                    "description": "Search depth (optional)"
                },
                "native_language": {
                    "type": "string",
                    "description": "Prefer sources in this language, e.g. 'Tamil', 'German'"
                },
                "include_domains": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict results to these hosts"
                },
                "exclude_domains": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Never return results from these hosts"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let depth = match arguments["depth"].as_str() {
            Some(s) => s
                .parse::<Depth>()
                .map_err(ToolError::InvalidArguments)?,
            None => self.default_depth,
        };

        let mut query = query.to_string();
        if let Some(native) = arguments["native_language"].as_str()
            && !lang::is_english(native)
        {
            query = format!(
                "{query}; content in {native} only; exclude English sources; do not translate"
            );
        }

        let items = self
            .client
            .search(SearchQuery {
                query,
                depth,
                include_domains: string_array(&arguments, "include_domains"),
                exclude_domains: string_array(&arguments, "exclude_domains"),
            })
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: e.to_string(),
            })?;

        Ok(serde_json::json!({ "results": items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stringer_core::error::SearchError;
    use stringer_core::search::SearchItem;
    use std::sync::Mutex;

    struct RecordingSearch {
        queries: Mutex<Vec<SearchQuery>>,
    }

    impl RecordingSearch {
        fn new() -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchClient for RecordingSearch {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, query: SearchQuery) -> Result<Vec<SearchItem>, SearchError> {
            self.queries.lock().unwrap().push(query);
            Ok(vec![SearchItem {
                title: "Result".into(),
                url: "https://example.in/1".into(),
                snippet: "snippet".into(),
            }])
        }
    }

    #[test]
    fn tool_definition() {
        let tool = WebSearchTool::new(Arc::new(RecordingSearch::new()), Depth::Standard);
        assert_eq!(tool.name(), "web_search");
        assert!(tool.serial_group().is_none());
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["query"]));
    }

    #[tokio::test]
    async fn missing_query_returns_error() {
        let tool = WebSearchTool::new(Arc::new(RecordingSearch::new()), Depth::Standard);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn non_english_language_biases_query() {
        let client = Arc::new(RecordingSearch::new());
        let tool = WebSearchTool::new(client.clone(), Depth::Standard);
        tool.execute(serde_json::json!({
            "query": "chennai news",
            "native_language": "Tamil"
        }))
        .await
        .unwrap();

        let queries = client.queries.lock().unwrap();
        assert!(queries[0].query.contains("content in Tamil only"));
        assert!(queries[0].query.contains("exclude English sources"));
    }

    #[tokio::test]
    async fn english_language_leaves_query_unchanged() {
        let client = Arc::new(RecordingSearch::new());
        let tool = WebSearchTool::new(client.clone(), Depth::Standard);
        tool.execute(serde_json::json!({
            "query": "london news",
            "native_language": "English"
        }))
        .await
        .unwrap();

        let queries = client.queries.lock().unwrap();
        assert_eq!(queries[0].query, "london news");
    }

    #[tokio::test]
    async fn depth_and_domain_filters_forwarded() {
        let client = Arc::new(RecordingSearch::new());
        let tool = WebSearchTool::new(client.clone(), Depth::Standard);
        let payload = tool
            .execute(serde_json::json!({
                "query": "q",
                "depth": "deep",
                "include_domains": ["a.in"],
                "exclude_domains": ["b.com"]
            }))
            .await
            .unwrap();

        let queries = client.queries.lock().unwrap();
        assert_eq!(queries[0].depth, Depth::Deep);
        assert_eq!(queries[0].include_domains, vec!["a.in"]);
        assert_eq!(queries[0].exclude_domains, vec!["b.com"]);
        assert_eq!(payload["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_depth_rejected() {
        let tool = WebSearchTool::new(Arc::new(RecordingSearch::new()), Depth::Standard);
        let result = tool
            .execute(serde_json::json!({"query": "q", "depth": "exhaustive"}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
