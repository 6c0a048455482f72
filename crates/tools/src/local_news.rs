//! Local news search — recent items from native-language outlets.
//!
//! Uses a `site:` prefix to prioritize outlets already discovered by
//! `find_local_sources`, and drives the source-filter loop so drifting
//! global/English results tighten the domain filters. Member of the same
//! dependent chain as the discovery tool.

use async_trait::async_trait;
use std::sync::Arc;

use stringer_core::error::ToolError;
use stringer_core::event::EventBus;
use stringer_core::search::{Depth, SearchClient, SearchQuery};
use stringer_core::tool::Tool;

use crate::lang;
use crate::source_filter::{DomainPolicy, FilteredSearch};
use crate::web_search::string_array;

/// Most sites carried in the `site:` prefix.
const MAX_SITE_TERMS: usize = 10;

pub struct SearchLocalNewsTool {
    client: Arc<dyn SearchClient>,
    max_attempts: u32,
    default_since_days: u32,
    top_n: usize,
    global_excludes: Vec<String>,
    events: Option<Arc<EventBus>>,
}

impl SearchLocalNewsTool {
    pub fn new(
        client: Arc<dyn SearchClient>,
        max_attempts: u32,
        default_since_days: u32,
        top_n: usize,
        global_excludes: Vec<String>,
    ) -> Self {
        Self {
            client,
            max_attempts,
            default_since_days,
            top_n,
            global_excludes,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Build the news query, with an optional `(site:a OR site:b)` prefix.
fn news_query(place: &str, native_language: &str, sites: &[String], since_days: u32) -> String {
    let site_filter = if sites.is_empty() {
        String::new()
    } else {
        let terms: Vec<String> = sites
            .iter()
            .take(MAX_SITE_TERMS)
            .map(|s| format!("site:{s}"))
            .collect();
        format!("({}) ", terms.join(" OR "))
    };

    if lang::is_english(native_language) {
        format!(
            "{site_filter}{place} local news in {native_language} last {since_days} days; \
             content in {native_language}; do not translate"
        )
    } else {
        format!(
            "{site_filter}{place} local news in {native_language} last {since_days} days; \
             content in {native_language} only; exclude English sources; do not translate"
        )
    }
}

#[async_trait]
impl Tool for SearchLocalNewsTool {
    fn name(&self) -> &str {
        "search_local_news"
    }

    fn description(&self) -> &str {
        "Search recent local news for a place, REQUIRING sources in the specified native \
         language. Use the same native language that was used in find_local_sources, and \
         pass the discovered sites to prioritize them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "place": {
                    "type": "string",
                    "description": "City or region name (optionally include country)"
                },
                "native_language": {
                    "type": "string",
                    "description": "Native language of the area (REQUIRED)"
                },
                "sites": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Site domains to prioritize (from find_local_sources)"
                },
                "since_days": {
                    "type": "integer",
                    "description": "Recency window in days (default 7)"
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
            "required": ["place", "native_language"]
        })
    }

    fn serial_group(&self) -> Option<&str> {
        Some("source-filter")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let place = arguments["place"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'place' argument".into()))?;
        let native_language = arguments["native_language"].as_str().ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'native_language' argument".into())
        })?;
        let sites = string_array(&arguments, "sites");
        let since_days = arguments["since_days"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or(self.default_since_days);

        // Discovered sites double as the initial inclusion set
        let mut include_domains = string_array(&arguments, "include_domains");
        for site in &sites {
            if !include_domains.contains(site) {
                include_domains.push(site.clone());
            }
        }

        let policy = DomainPolicy::for_language(native_language, &self.global_excludes);
        let mut filtered = FilteredSearch::new(self.max_attempts, self.top_n);
        if let Some(events) = &self.events {
            filtered = filtered.with_events(events.clone());
        }

        let outcome = filtered
            .run(
                self.client.as_ref(),
                SearchQuery {
                    query: news_query(place, native_language, &sites, since_days),
                    depth: Depth::Deep,
                    include_domains,
                    exclude_domains: string_array(&arguments, "exclude_domains"),
                },
                &policy,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_local_news".into(),
                reason: e.to_string(),
            })?;

        Ok(serde_json::json!({
            "place": place,
            "native_language": native_language,
            "since_days": since_days,
            "results": outcome.items,
            "policy_satisfied": outcome.policy_satisfied,
            "attempts": outcome.attempts,
        }))
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
        page: Vec<SearchItem>,
    }

    impl RecordingSearch {
        fn new(page: Vec<SearchItem>) -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
                page,
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
            Ok(self.page.clone())
        }
    }

    fn item(url: &str) -> SearchItem {
        SearchItem {
            title: url.into(),
            url: url.into(),
            snippet: String::new(),
        }
    }

    #[test]
    fn query_includes_site_filter_and_language_clause() {
        let q = news_query(
            "Chennai",
            "Tamil",
            &["dinamalar.in".into(), "maalaimalar.in".into()],
            7,
        );
        assert!(q.starts_with("(site:dinamalar.in OR site:maalaimalar.in) "));
        assert!(q.contains("last 7 days"));
        assert!(q.contains("content in Tamil only"));
        assert!(q.contains("exclude English sources"));
    }

    #[test]
    fn english_query_skips_exclusion_clause() {
        let q = news_query("London", "English", &[], 3);
        assert!(!q.contains("exclude English sources"));
        assert!(q.contains("content in English"));
    }

    #[test]
    fn site_terms_are_capped() {
        let sites: Vec<String> = (0..20).map(|i| format!("s{i}.in")).collect();
        let q = news_query("Chennai", "Tamil", &sites, 7);
        assert_eq!(q.matches("site:").count(), MAX_SITE_TERMS);
    }

    #[tokio::test]
    async fn sites_seed_the_inclusion_set() {
        let client = Arc::new(RecordingSearch::new(vec![item("https://dinamalar.in/1")]));
        let tool = SearchLocalNewsTool::new(client.clone(), 4, 7, 10, vec![]);
        tool.execute(serde_json::json!({
            "place": "Chennai",
            "native_language": "Tamil",
            "sites": ["dinamalar.in"]
        }))
        .await
        .unwrap();

        let queries = client.queries.lock().unwrap();
        assert_eq!(queries[0].depth, Depth::Deep);
        assert!(queries[0].include_domains.contains(&"dinamalar.in".to_string()));
    }

    #[tokio::test]
    async fn payload_carries_policy_flag_and_results() {
        let client = Arc::new(RecordingSearch::new(vec![item("https://dinamalar.in/1")]));
        let tool = SearchLocalNewsTool::new(client, 4, 7, 10, vec![]);
        let payload = tool
            .execute(serde_json::json!({
                "place": "Chennai",
                "native_language": "Tamil"
            }))
            .await
            .unwrap();

        assert_eq!(payload["policy_satisfied"], true);
        assert_eq!(payload["since_days"], 7);
        assert_eq!(payload["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_native_language_rejected() {
        let client = Arc::new(RecordingSearch::new(vec![]));
        let tool = SearchLocalNewsTool::new(client, 4, 7, 10, vec![]);
        let result = tool.execute(serde_json::json!({"place": "Chennai"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
