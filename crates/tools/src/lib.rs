//! Capability handlers for Stringer.
//!
//! Tools give the agent the ability to act: search the web, discover and
//! query local-language news outlets, translate text, save files, and
//! generate images. The source-filter retry policy that keeps search
//! results inside the language/domain policy also lives here, layered on
//! the `SearchClient` seam.

pub mod image_generate;
pub mod lang;
pub mod linkup;
pub mod local_news;
pub mod local_sources;
pub mod save_file;
pub mod source_filter;
pub mod translate;
pub mod web_search;

use std::sync::Arc;

use stringer_config::AppConfig;
use stringer_core::error::ToolError;
use stringer_core::event::EventBus;
use stringer_core::search::{Depth, SearchClient};
use stringer_core::tool::ToolRegistry;

pub use source_filter::{DomainPolicy, FilterOutcome, FilteredSearch, SourcePolicy};

/// Build the default tool registry from configuration.
///
/// The search credential is required — research cannot proceed without it.
/// Translation and image generation are optional: without their keys the
/// tools still register and report a missing-credential error outcome when
/// called, so the model can adapt.
pub fn registry_from_config(
    config: &AppConfig,
    events: Arc<EventBus>,
) -> Result<ToolRegistry, ToolError> {
    let search_key =
        config
            .search
            .api_key
            .clone()
            .ok_or_else(|| ToolError::MissingCredential {
                tool_name: "web_search".into(),
                variable: "LINKUP_API_KEY".into(),
            })?;
    let search: Arc<dyn SearchClient> =
        Arc::new(linkup::LinkupClient::new(&config.search.base_url, search_key).map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: e.to_string(),
            }
        })?);

    let default_depth = config
        .search
        .depth
        .parse::<Depth>()
        .unwrap_or(Depth::Standard);

    let translate_backend: Option<Arc<dyn translate::TranslateBackend>> =
        match &config.translate.api_key {
            Some(key) => Some(Arc::new(translate::DeepLBackend::new(
                &config.translate.base_url,
                key,
            )?)),
            None => None,
        };

    let image_backend: Option<Arc<dyn image_generate::ImageBackend>> = match &config.image.api_key
    {
        Some(key) => Some(Arc::new(image_generate::FreepikBackend::new(
            &config.image.base_url,
            key,
        )?)),
        None => None,
    };

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(web_search::WebSearchTool::new(
        search.clone(),
        default_depth,
    )));
    registry.register(Box::new(
        local_sources::FindLocalSourcesTool::new(
            search.clone(),
            config.filter.max_attempts,
            config.search.top_n,
            config.filter.global_excludes.clone(),
        )
        .with_events(events.clone()),
    ));
    registry.register(Box::new(
        local_news::SearchLocalNewsTool::new(
            search,
            config.filter.max_attempts,
            config.search.since_days,
            config.search.top_n,
            config.filter.global_excludes.clone(),
        )
        .with_events(events),
    ));
    registry.register(Box::new(translate::TranslateTool::new(
        translate_backend,
        &config.translate.target_lang,
    )));
    registry.register(Box::new(save_file::SaveFileTool::new()));
    registry.register(Box::new(image_generate::GenerateImageTool::new(
        image_backend,
        config.image.save_dir.clone(),
    )));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_requires_search_credential() {
        let config = AppConfig::default();
        let err = registry_from_config(&config, Arc::new(EventBus::default())).unwrap_err();
        assert!(err.to_string().contains("LINKUP_API_KEY"));
    }

    #[test]
    fn registry_registers_all_tools() {
        let config = AppConfig {
            search: stringer_config::SearchConfig {
                api_key: Some("lk-test".into()),
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let registry = registry_from_config(&config, Arc::new(EventBus::default())).unwrap();

        let mut names = registry.names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "find_local_sources",
                "generate_image",
                "save_file",
                "search_local_news",
                "translate_text",
                "web_search",
            ]
        );

        // The dependent chain is declared on the search-flow tools only
        assert_eq!(registry.serial_group("find_local_sources"), Some("source-filter"));
        assert_eq!(registry.serial_group("search_local_news"), Some("source-filter"));
        assert_eq!(registry.serial_group("web_search"), None);
        assert_eq!(registry.serial_group("translate_text"), None);
    }
}
