//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act in the world: search the web, translate
//! text, save files, generate images. The orchestrator only ever sees the
//! uniform `(name, arguments) -> ToolResult` contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::ToolError;
use crate::model::ToolSchema;

/// A request to execute a tool, as emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// What a tool invocation produced: a structured payload or an error.
///
/// This is the single normalization point for handler responses — whatever
/// shape a backend returns, it becomes one of these two variants before the
/// orchestrator sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool executed and returned structured data.
    Payload(serde_json::Value),

    /// The tool failed; the message is surfaced to the model so it can adapt.
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }

    /// Render the outcome as the text fed back to the model.
    pub fn to_model_text(&self) -> String {
        match self {
            ToolOutcome::Payload(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
            }
            ToolOutcome::Error(message) => {
                serde_json::json!({ "status": "error", "error": message }).to_string()
            }
        }
    }
}

/// The result of a tool execution, keyed back to its call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Name of the tool that ran (or was requested)
    pub name: String,

    /// Payload or error
    pub outcome: ToolOutcome,
}

/// The core Tool trait.
///
/// Each capability (web_search, translate_text, save_file, ...) implements
/// this trait and registers in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Dependent-chain marker. Tools returning the same group key are part
    /// of a tighten-and-retry chain: the dispatcher runs their calls
    /// serially, in emission order, never concurrently with each other.
    fn serial_group(&self) -> Option<&str> {
        None
    }

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a schema for the model.
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The turn loop uses this to:
/// 1. Get tool schemas to send to the model
/// 2. Dispatch tool calls when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool schemas (for sending to the model).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.to_schema()).collect()
    }

    /// The serial group of a named tool, if it declares one.
    pub fn serial_group(&self, name: &str) -> Option<&str> {
        self.tools.get(name).and_then(|t| t.serial_group())
    }

    /// Dispatch a tool call.
    ///
    /// This never fails: an unknown name or a handler error is captured as
    /// a `ToolOutcome::Error` so one bad call never aborts the turn.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let outcome = match self.tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, call_id = %call.id, "Tool call to unregistered name");
                ToolOutcome::Error(ToolError::NotFound(call.name.clone()).to_string())
            }
            Some(tool) => match tool.execute(call.arguments.clone()).await {
                Ok(payload) => ToolOutcome::Payload(payload),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    ToolOutcome::Error(e.to_string())
                }
            },
        };

        ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            outcome,
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
