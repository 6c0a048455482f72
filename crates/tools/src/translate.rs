//! Translation tool — DeepL-style backend behind a narrow trait.
//!
//! The failure-tolerance contract is binding: a translation call either
//! returns translated text or an error payload. It never raises past the
//! handler boundary, so the turn loop treats a missing key or a backend
//! failure as a normal error result and continues.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use stringer_core::error::ToolError;
use stringer_core::tool::Tool;

use crate::lang;

/// The translation backend seam. Errors come back as plain strings; the
/// tool folds them into the error outcome.
#[async_trait]
pub trait TranslateBackend: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
        formality: Option<&str>,
    ) -> Result<Translation, String>;
}

/// A completed translation.
#[derive(Debug, Clone)]
pub struct Translation {
    pub text: String,
    pub detected_source_lang: Option<String>,
}

/// HTTP client for the DeepL `/translate` endpoint.
pub struct DeepLBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DeepLBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "translate_text".into(),
                reason: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl TranslateBackend for DeepLBackend {
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
        formality: Option<&str>,
    ) -> Result<Translation, String> {
        let url = format!("{}/translate", self.base_url);

        let mut body = serde_json::json!({
            "text": [text],
            "target_lang": target_lang,
        });
        if let Some(source) = source_lang {
            body["source_lang"] = serde_json::json!(source);
        }
        if let Some(formality) = formality {
            body["formality"] = serde_json::json!(formality);
        }

        debug!(target = target_lang, "Sending translation request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Translation backend returned error");
            return Err(format!("translation failed (status {status}): {error_body}"));
        }

        let api_response: ApiTranslateResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse translation response: {e}"))?;

        let first = api_response
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| "empty translation response".to_string())?;

        Ok(Translation {
            text: first.text,
            detected_source_lang: first.detected_source_language,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiTranslateResponse {
    #[serde(default)]
    translations: Vec<ApiTranslation>,
}

#[derive(Debug, Deserialize)]
struct ApiTranslation {
    text: String,
    #[serde(default)]
    detected_source_language: Option<String>,
}

/// The translate_text tool.
///
/// Constructed without a backend when no credential is configured; calls
/// then yield an error outcome naming the missing variable.
pub struct TranslateTool {
    backend: Option<Arc<dyn TranslateBackend>>,
    default_target: String,
}

impl TranslateTool {
    pub fn new(backend: Option<Arc<dyn TranslateBackend>>, default_target: impl Into<String>) -> Self {
        Self {
            backend,
            default_target: default_target.into(),
        }
    }
}

#[async_trait]
impl Tool for TranslateTool {
    fn name(&self) -> &str {
        "translate_text"
    }

    fn description(&self) -> &str {
        "Translate text to a target language. Returns the translated text, or an error field \
         when translation is unavailable — it never crashes the caller."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to translate"
                },
                "target_lang": {
                    "type": "string",
                    "description": "Target language code, e.g. 'EN-US', 'DE', 'FR'"
                },
                "source_lang": {
                    "type": "string",
                    "description": "Optional source language code (auto-detected if omitted)"
                },
                "formality": {
                    "type": "string",
                    "enum": ["default", "more", "less"],
                    "description": "Optional formality level"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let Some(backend) = &self.backend else {
            return Err(ToolError::MissingCredential {
                tool_name: "translate_text".into(),
                variable: "DEEPL_AUTH_KEY".into(),
            });
        };

        let target = lang::normalize_target_lang(
            arguments["target_lang"].as_str().unwrap_or(&self.default_target),
        );
        let source = lang::normalize_source_lang(arguments["source_lang"].as_str());
        let formality = arguments["formality"].as_str();

        match backend
            .translate(text, &target, source.as_deref(), formality)
            .await
        {
            Ok(translation) => Ok(serde_json::json!({
                "translated_text": translation.text,
                "target_lang": target,
                "detected_source_lang": translation.detected_source_lang,
            })),
            Err(reason) => Err(ToolError::ExecutionFailed {
                tool_name: "translate_text".into(),
                reason,
            }),
        }
    }
}
