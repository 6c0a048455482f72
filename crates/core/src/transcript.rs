//! Transcript and Session domain types.
//!
//! The transcript is the ordered conversation history the orchestrator
//! reads and writes: user/system/assistant text plus tool calls and their
//! results. It is mutated solely by the turn loop — capability handlers
//! never touch it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single entry in the transcript.
///
/// A closed set of variants: the orchestrator only ever sees these shapes,
/// and unknown tool names are rejected at the registry boundary instead of
/// being probed for defensively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// System instructions (briefing, rules).
    System { text: String },

    /// A message from the end user.
    User { text: String },

    /// A text message from the assistant.
    Assistant { text: String },

    /// A tool invocation requested by the model.
    ToolCall(ToolCall),

    /// The outcome of a tool invocation.
    ToolResult(ToolResult),
}

impl Entry {
    /// The call id this entry carries, if any.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Entry::ToolCall(call) => Some(&call.id),
            Entry::ToolResult(result) => Some(&result.call_id),
            _ => None,
        }
    }
}

/// The ordered conversation history for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Unique session id
    pub id: SessionId,

    /// Ordered entries
    pub entries: Vec<Entry>,

    /// When this transcript was created
    pub created_at: DateTime<Utc>,

    /// When the last entry was added
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    /// Create a new empty transcript.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a transcript seeded with a system briefing and a user message.
    pub fn seeded(system: impl Into<String>, user: impl Into<String>) -> Self {
        let mut t = Self::new();
        t.push(Entry::System {
            text: system.into(),
        });
        t.push(Entry::User { text: user.into() });
        t
    }

    /// Append an entry.
    ///
    /// Tool results must go through [`push_result`](Self::push_result) so
    /// referential integrity is enforced.
    pub fn push(&mut self, entry: Entry) {
        self.updated_at = Utc::now();
        self.entries.push(entry);
    }

    /// Append a tool result, checking that its call was recorded earlier.
    pub fn push_result(&mut self, result: ToolResult) -> Result<(), TranscriptError> {
        if !self.has_call(&result.call_id) {
            return Err(TranscriptError::OrphanResult {
                call_id: result.call_id,
            });
        }
        if self
            .entries
            .iter()
            .any(|e| matches!(e, Entry::ToolResult(r) if r.call_id == result.call_id))
        {
            return Err(TranscriptError::DuplicateResult {
                call_id: result.call_id,
            });
        }
        self.push(Entry::ToolResult(result));
        Ok(())
    }

    /// Whether a tool call with the given id has been recorded.
    pub fn has_call(&self, call_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, Entry::ToolCall(c) if c.id == call_id))
    }

    /// Whether the transcript is seeded for a turn-loop run:
    /// at least one system entry and one user entry.
    pub fn is_seeded(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, Entry::System { .. }))
            && self.entries.iter().any(|e| matches!(e, Entry::User { .. }))
    }

    /// Check referential integrity: every tool result matches exactly one
    /// earlier tool call.
    pub fn verify_integrity(&self) -> Result<(), TranscriptError> {
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Entry::ToolResult(result) = entry {
                let matching = self.entries[..idx]
                    .iter()
                    .filter(|e| matches!(e, Entry::ToolCall(c) if c.id == result.call_id))
                    .count();
                if matching != 1 {
                    return Err(TranscriptError::OrphanResult {
                        call_id: result.call_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The text of the last assistant entry, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match e {
            Entry::Assistant { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// A conversation session: the transcript plus the model continuation
/// token carried between turns.
///
/// Passed by ownership or mutable reference into the orchestrator — there
/// is no process-wide conversation state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub transcript: Transcript,
    pub continuation: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the history and continuation token for a fresh conversation.
    pub fn reset(&mut self) {
        self.transcript = Transcript::new();
        self.continuation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolOutcome;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "web_search".into(),
            arguments: serde_json::json!({"query": "test"}),
        }
    }

    fn result(call_id: &str) -> ToolResult {
        ToolResult {
            call_id: call_id.into(),
            name: "web_search".into(),
            outcome: ToolOutcome::Payload(serde_json::json!({"items": []})),
        }
    }

    #[test]
    fn seeded_transcript_is_seeded() {
        let t = Transcript::seeded("You are a research assistant.", "Chennai news");
        assert!(t.is_seeded());
        assert_eq!(t.entries.len(), 2);
    }

    #[test]
    fn empty_transcript_is_not_seeded() {
        let t = Transcript::new();
        assert!(!t.is_seeded());
    }

    #[test]
    fn result_requires_prior_call() {
        let mut t = Transcript::new();
        let err = t.push_result(result("call_1")).unwrap_err();
        assert!(matches!(err, TranscriptError::OrphanResult { .. }));
    }

    #[test]
    fn result_after_call_is_accepted() {
        let mut t = Transcript::new();
        t.push(Entry::ToolCall(call("call_1")));
        t.push_result(result("call_1")).unwrap();
        t.verify_integrity().unwrap();
    }

    #[test]
    fn duplicate_result_rejected() {
        let mut t = Transcript::new();
        t.push(Entry::ToolCall(call("call_1")));
        t.push_result(result("call_1")).unwrap();
        let err = t.push_result(result("call_1")).unwrap_err();
        assert!(matches!(err, TranscriptError::DuplicateResult { .. }));
    }

    #[test]
    fn integrity_detects_result_before_call() {
        let mut t = Transcript::new();
        // Bypass push_result to simulate a corrupted history
        t.push(Entry::ToolResult(result("call_2")));
        t.push(Entry::ToolCall(call("call_2")));
        assert!(t.verify_integrity().is_err());
    }

    #[test]
    fn session_reset_clears_history_and_continuation() {
        let mut session = Session::new();
        session.transcript.push(Entry::User {
            text: "hello".into(),
        });
        session.continuation = Some("resp_123".into());

        session.reset();
        assert!(session.transcript.entries.is_empty());
        assert!(session.continuation.is_none());
    }

    #[test]
    fn entry_serialization_roundtrip() {
        let entry = Entry::ToolCall(call("call_7"));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""kind":"tool_call""#));
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.call_id(), Some("call_7"));
    }

    #[test]
    fn last_assistant_text_finds_latest() {
        let mut t = Transcript::new();
        t.push(Entry::Assistant {
            text: "first".into(),
        });
        t.push(Entry::Assistant {
            text: "second".into(),
        });
        assert_eq!(t.last_assistant_text(), Some("second"));
    }
}
