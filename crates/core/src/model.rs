//! ModelClient trait — the abstraction over model backends.
//!
//! A ModelClient knows how to send the transcript to a language model and
//! get the next step back: either a batch of tool calls, a final text
//! message, or a stream of deltas.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::tool::ToolCall;
use crate::transcript::Entry;

/// A tool schema sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A request for the model's next step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The transcript entries so far
    pub entries: Vec<Entry>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Continuation token from the previous turn, if the backend tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// The model's next step: zero or more tool calls and/or a text message.
///
/// `tool_calls.is_empty()` means this step is final for the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStep {
    /// Assistant text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Tool calls requested this step, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// A cooperating agent took over (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,

    /// Continuation token for the next turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

impl ModelStep {
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// A single chunk in a backend-level streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Complete tool calls (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// A cooperating agent took over (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// Events emitted by the engine's streaming run.
///
/// Produced in order by the turn loop as it drives the model and the tools;
/// consumed exactly once, in arrival order, by the stream processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial response text from the model.
    TokenDelta { text: String },

    /// A tool call is being dispatched.
    ToolCallStarted { id: String, name: String },

    /// A tool call resolved; `preview` is display-bounded, the full payload
    /// lives untouched in the transcript.
    ToolCallFinished {
        id: String,
        name: String,
        preview: String,
    },

    /// A differently-named cooperating agent is now active.
    AgentHandoff { agent: String },

    /// The authoritative final text for the turn. Overrides any partial
    /// token buffer.
    FinalMessage { text: String },
}

impl StreamEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TokenDelta { .. } => "token_delta",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::AgentHandoff { .. } => "agent_handoff",
            Self::FinalMessage { .. } => "final_message",
        }
    }
}

/// The core ModelClient trait.
///
/// Every backend (OpenAI-compatible HTTP, scripted/offline) implements this
/// trait. The turn loop calls `next_step()` or `stream()` without knowing
/// which backend is in use.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a request and get the complete next step.
    async fn next_step(&self, request: ModelRequest)
        -> std::result::Result<ModelStep, ModelError>;

    /// Send a request and get a stream of chunks.
    ///
    /// Default implementation calls `next_step()` and wraps the result as a
    /// single chunk.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ModelChunk, ModelError>>,
        ModelError,
    > {
        let step = self.next_step(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(ModelChunk {
                content: step.message,
                tool_calls: step.tool_calls,
                handoff: step.handoff,
                done: true,
            }))
            .await;
        Ok(rx)
    }
}
