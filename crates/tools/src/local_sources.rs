//! Local source discovery — find native-language news outlets for a place.
//!
//! Drives the source-filter retry loop against the search backend until the
//! discovered outlets satisfy the language policy or attempts run out. Part
//! of the "find sources then search" dependent chain, so calls are
//! serialized by the dispatcher.

use async_trait::async_trait;
use std::sync::Arc;

use stringer_core::error::ToolError;
use stringer_core::event::EventBus;
use stringer_core::search::{Depth, SearchClient, SearchQuery};
use stringer_core::tool::Tool;

use crate::lang;
use crate::source_filter::{DomainPolicy, FilteredSearch};
use crate::web_search::string_array;

pub struct FindLocalSourcesTool {
    client: Arc<dyn SearchClient>,
    max_attempts: u32,
    default_top_n: usize,
    global_excludes: Vec<String>,
    events: Option<Arc<EventBus>>,
}

impl FindLocalSourcesTool {
    pub fn new(
        client: Arc<dyn SearchClient>,
        max_attempts: u32,
        default_top_n: usize,
        global_excludes: Vec<String>,
    ) -> Self {
        Self {
            client,
            max_attempts,
            default_top_n,
            global_excludes,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Build the discovery query for a place and its native language.
fn discovery_query(place: &str, native_language: &str) -> String {
    if lang::is_english(native_language) {
        format!(
            "local news websites for {place} in {native_language}; \
             official newspaper, tv, radio sites; sources in {native_language}; do not translate"
        )
    } else {
        format!(
            "local news websites for {place} in {native_language}; \
             official newspaper, tv, radio sites; sources in {native_language} only; \
             exclude English sources; do not translate"
        )
    }
}

#[async_trait]
impl Tool for FindLocalSourcesTool {
    fn name(&self) -> &str {
        "find_local_sources"
    }

    fn description(&self) -> &str {
        "Discover local news websites for a given place, REQUIRING sources in the place's \
         native language. You must determine the native language first (e.g., Tamil for \
         Chennai, Marathi for Mumbai, Hindi for Delhi)."
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
                    "description": "Native language of the area, e.g. 'Tamil', 'German' (REQUIRED)"
                },
                "top_n": {
                    "type": "integer",
                    "description": "Maximum number of sites to return (default 10)"
                },
                "include_domains": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict discovery to these hosts"
                },
                "exclude_domains": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Never return these hosts"
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
        let top_n = arguments["top_n"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(self.default_top_n);

        let mut exclude_domains = string_array(&arguments, "exclude_domains");
        exclude_domains.extend(self.global_excludes.iter().cloned());

        let policy = DomainPolicy::for_language(native_language, &self.global_excludes);
        let mut filtered = FilteredSearch::new(self.max_attempts, top_n);
        if let Some(events) = &self.events {
            filtered = filtered.with_events(events.clone());
        }

        let outcome = filtered
            .run(
                self.client.as_ref(),
                SearchQuery {
                    query: discovery_query(place, native_language),
                    depth: Depth::Standard,
                    include_domains: string_array(&arguments, "include_domains"),
                    exclude_domains,
                },
                &policy,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "find_local_sources".into(),
                reason: e.to_string(),
            })?;

        // Site list: deduped hosts in first-seen order
        let mut sites: Vec<String> = Vec::new();
        for item in &outcome.items {
            if let Some(host) = item.host()
                && !sites.contains(&host)
            {
                sites.push(host);
            }
        }

        Ok(serde_json::json!({
            "place": place,
            "native_language": native_language,
            "sites": sites,
            "policy_satisfied": outcome.policy_satisfied,
            "attempts": outcome.attempts,
        }))
    }
}
