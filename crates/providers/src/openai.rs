//! OpenAI-compatible model client.
//!
//! Works with OpenAI, OpenRouter, and any backend exposing a compatible
//! `/v1/chat/completions` endpoint.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling with incremental tool-call delta assembly

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use stringer_core::error::ModelError;
use stringer_core::model::{ModelChunk, ModelClient, ModelRequest, ModelStep};
use stringer_core::tool::ToolCall;
use stringer_core::transcript::Entry;

/// An OpenAI-compatible model client.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ModelError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Convert transcript entries to OpenAI API messages.
    ///
    /// Consecutive tool-call entries collapse into a single assistant
    /// message carrying the `tool_calls` array, as the API expects.
    fn to_api_messages(entries: &[Entry]) -> Vec<ApiMessage> {
        let mut messages = Vec::new();
        let mut pending_calls: Vec<ApiToolCall> = Vec::new();

        let flush = |messages: &mut Vec<ApiMessage>, pending: &mut Vec<ApiToolCall>| {
            if !pending.is_empty() {
                messages.push(ApiMessage {
                    role: "assistant".into(),
                    content: None,
                    tool_calls: Some(std::mem::take(pending)),
                    tool_call_id: None,
                });
            }
        };

        for entry in entries {
            match entry {
                Entry::ToolCall(call) => {
                    pending_calls.push(ApiToolCall {
                        id: call.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    });
                }
                other => {
                    flush(&mut messages, &mut pending_calls);
                    match other {
                        Entry::System { text } => messages.push(ApiMessage {
                            role: "system".into(),
                            content: Some(text.clone()),
                            tool_calls: None,
                            tool_call_id: None,
                        }),
                        Entry::User { text } => messages.push(ApiMessage {
                            role: "user".into(),
                            content: Some(text.clone()),
                            tool_calls: None,
                            tool_call_id: None,
                        }),
                        Entry::Assistant { text } => messages.push(ApiMessage {
                            role: "assistant".into(),
                            content: Some(text.clone()),
                            tool_calls: None,
                            tool_call_id: None,
                        }),
                        Entry::ToolResult(result) => messages.push(ApiMessage {
                            role: "tool".into(),
                            content: Some(result.outcome.to_model_text()),
                            tool_calls: None,
                            tool_call_id: Some(result.call_id.clone()),
                        }),
                        Entry::ToolCall(_) => unreachable!(),
                    }
                }
            }
        }
        flush(&mut messages, &mut pending_calls);
        messages
    }

    fn to_api_tools(tools: &[stringer_core::model::ToolSchema]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, request: &ModelRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.entries),
            "temperature": request.temperature,
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn check_status(status: u16, body: String) -> Result<(), ModelError> {
        match status {
            200 => Ok(()),
            429 => Err(ModelError::RateLimited {
                retry_after_secs: 5,
            }),
            401 | 403 => Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                warn!(status, body = %body, "Model backend returned error");
                Err(ModelError::ApiError {
                    status_code: status,
                    message: body,
                })
            }
        }
    }
}

/// Parse a tool-call argument string into a JSON value, tolerating the
/// occasional malformed fragment from the backend.
fn parse_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

#[async_trait]
impl ModelClient for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_step(&self, request: ModelRequest) -> Result<ModelStep, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, false);

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::check_status(status, error_body).unwrap_err());
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let continuation = api_response.id.clone();
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(ModelStep {
            message: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            handoff: None,
            continuation,
        })
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<ModelChunk, ModelError>>, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request, true);

        debug!(backend = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::check_status(status, error_body).unwrap_err());
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let backend_name = self.name.clone();

        // Read the SSE byte stream and parse chunks on a separate task
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Accumulators for tool call deltas (keyed by index)
            let mut accumulators: std::collections::BTreeMap<u32, ToolCallAccumulator> =
                std::collections::BTreeMap::new();

            let finish = |accs: &std::collections::BTreeMap<u32, ToolCallAccumulator>| ModelChunk {
                tool_calls: accs.values().map(|acc| acc.to_tool_call()).collect(),
                done: true,
                ..Default::default()
            };

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ModelError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();

                        if data == "[DONE]" {
                            let _ = tx.send(Ok(finish(&accumulators))).await;
                            return;
                        }

                        match serde_json::from_str::<StreamResponse>(data) {
                            Ok(stream_resp) => {
                                if let Some(choice) = stream_resp.choices.first() {
                                    let delta = &choice.delta;

                                    if let Some(ref tc_deltas) = delta.tool_calls {
                                        for tc_delta in tc_deltas {
                                            let acc = accumulators
                                                .entry(tc_delta.index)
                                                .or_default();

                                            if let Some(ref id) = tc_delta.id {
                                                acc.id = id.clone();
                                            }
                                            if let Some(ref func) = tc_delta.function {
                                                if let Some(ref name) = func.name {
                                                    acc.name = name.clone();
                                                }
                                                if let Some(ref args) = func.arguments {
                                                    acc.arguments.push_str(args);
                                                }
                                            }
                                        }
                                    }

                                    let has_content =
                                        delta.content.as_ref().is_some_and(|c| !c.is_empty());

                                    if has_content {
                                        let chunk = ModelChunk {
                                            content: delta.content.clone(),
                                            ..Default::default()
                                        };

                                        if tx.send(Ok(chunk)).await.is_err() {
                                            return; // receiver dropped
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                trace!(
                                    backend = %backend_name,
                                    data = %data,
                                    error = %e,
                                    "Ignoring unparseable SSE chunk"
                                );
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE] — send the final chunk anyway
            let _ = tx.send(Ok(finish(&accumulators))).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: parse_arguments(&self.arguments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stringer_core::tool::{ToolOutcome, ToolResult};

    #[test]
    fn openai_constructor() {
        let model = OpenAiCompatModel::openai("sk-test").unwrap();
        assert_eq!(model.name(), "openai");
        assert!(model.base_url.contains("api.openai.com"));
    }

    #[test]
    fn entry_conversion_basic_roles() {
        let entries = vec![
            Entry::System {
                text: "You are a research assistant".into(),
            },
            Entry::User {
                text: "Chennai news".into(),
            },
        ];
        let api_messages = OpenAiCompatModel::to_api_messages(&entries);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn consecutive_tool_calls_collapse_into_one_message() {
        let entries = vec![
            Entry::User {
                text: "find news".into(),
            },
            Entry::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({"query": "a"}),
            }),
            Entry::ToolCall(ToolCall {
                id: "call_2".into(),
                name: "find_local_sources".into(),
                arguments: serde_json::json!({"place": "Chennai"}),
            }),
            Entry::ToolResult(ToolResult {
                call_id: "call_1".into(),
                name: "web_search".into(),
                outcome: ToolOutcome::Payload(serde_json::json!({"items": []})),
            }),
        ];
        let api_messages = OpenAiCompatModel::to_api_messages(&entries);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[1].role, "assistant");
        assert_eq!(api_messages[1].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(api_messages[2].role, "tool");
        assert_eq!(api_messages[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn error_outcome_serialized_for_model() {
        let entries = vec![
            Entry::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "translate_text".into(),
                arguments: serde_json::json!({}),
            }),
            Entry::ToolResult(ToolResult {
                call_id: "call_1".into(),
                name: "translate_text".into(),
                outcome: ToolOutcome::Error("DEEPL_AUTH_KEY not set".into()),
            }),
        ];
        let api_messages = OpenAiCompatModel::to_api_messages(&entries);
        let tool_msg = &api_messages[1];
        assert!(tool_msg.content.as_ref().unwrap().contains("error"));
        assert!(tool_msg.content.as_ref().unwrap().contains("DEEPL_AUTH_KEY"));
    }

    #[test]
    fn tool_schema_conversion() {
        let tools = vec![stringer_core::model::ToolSchema {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatModel::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "web_search");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn malformed_arguments_fall_back_to_empty_object() {
        assert_eq!(parse_arguments("{not json"), serde_json::json!({}));
        assert_eq!(
            parse_arguments(r#"{"query": "ok"}"#),
            serde_json::json!({"query": "ok"})
        );
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_finish_chunk() {
        // Unknown fields like finish_reason are ignored
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"web_search","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.index, 0);
        assert_eq!(tc.id.as_deref(), Some("call_abc"));
        assert_eq!(
            tc.function.as_ref().unwrap().name.as_deref(),
            Some("web_search")
        );
    }

    #[test]
    fn tool_call_accumulator_assembly() {
        let mut acc = ToolCallAccumulator::default();

        // First delta: id + name
        acc.id = "call_123".into();
        acc.name = "web_search".into();
        acc.arguments.push_str("{\"query\"");

        // Second delta: more arguments
        acc.arguments.push_str(": \"chennai\"}");

        let tc = acc.to_tool_call();
        assert_eq!(tc.id, "call_123");
        assert_eq!(tc.name, "web_search");
        assert_eq!(tc.arguments, serde_json::json!({"query": "chennai"}));
    }

    #[test]
    fn parse_multiple_tool_calls_in_stream() {
        // Two parallel tool calls in one delta
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"web_search","arguments":""}},{"index":1,"id":"call_b","function":{"name":"translate_text","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tcs = parsed.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(tcs.len(), 2);
        assert_eq!(tcs[0].index, 0);
        assert_eq!(tcs[1].index, 1);
    }

    #[test]
    fn accumulators_preserve_emission_order() {
        // BTreeMap keyed by index keeps call order stable regardless of
        // delta interleaving
        let mut accs: std::collections::BTreeMap<u32, ToolCallAccumulator> = Default::default();
        accs.entry(1).or_default().id = "call_b".into();
        accs.entry(0).or_default().id = "call_a".into();
        let ids: Vec<String> = accs.values().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["call_a".to_string(), "call_b".to_string()]);
    }

    #[test]
    fn parse_api_response_with_id() {
        let data = r#"{
            "id": "chatcmpl-42",
            "choices": [{"message": {"role": "assistant", "content": "Hi"}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("chatcmpl-42"));
        assert_eq!(parsed.choices.len(), 1);
    }
}
