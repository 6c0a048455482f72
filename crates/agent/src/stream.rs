//! Streaming event processor.
//!
//! Converts the live, ordered, single-pass sequence of engine stream
//! events into (a) human-facing progress notices and (b) the final text
//! plus run statistics. Strictly single-consumer: events are processed in
//! arrival order and never buffered beyond the token display buffer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use stringer_core::budget::{BudgetMark, TurnBudget};
use stringer_core::model::StreamEvent;

/// Human-facing progress notices projected from stream events.
///
/// The CLI renders these; tests assert on them. Display-only — nothing
/// here feeds back into control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// First token delta arrived; the response text is streaming.
    ResponseStarted,
    /// A response token to render incrementally.
    Token(String),
    /// Tool call `seq` (1-based, this run) started.
    ToolStarted { seq: usize, name: String },
    /// A tool call finished; preview is truncated for display.
    ToolFinished { name: String, preview: String },
    /// A cooperating agent took over.
    Handoff { agent: String },
    /// Nearing the turn budget: consider narrowing scope.
    BudgetApproaching { used: u32, max_turns: u32 },
    /// One tool call left before the hard stop.
    BudgetFinal { used: u32, max_turns: u32 },
    /// The turn budget is spent; a forced summary follows.
    BudgetReached { used: u32, max_turns: u32 },
}

/// What a processed stream produced.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// The authoritative final text: the `FinalMessage` when one arrived,
    /// otherwise the best partial token buffer.
    pub final_text: String,

    /// The display token buffer (approximation, never authoritative).
    pub streamed: String,

    /// Tool calls observed this run.
    pub tool_calls_seen: usize,

    /// True when the channel closed before a `FinalMessage` — consumer
    /// cancellation or upstream interruption, not a failure.
    pub interrupted: bool,
}

/// Single-pass consumer of the engine's stream events.
pub struct StreamProcessor {
    budget: Arc<TurnBudget>,
    preview_chars: usize,
    notices: Option<mpsc::UnboundedSender<Notice>>,
}

impl StreamProcessor {
    pub fn new(budget: Arc<TurnBudget>, preview_chars: usize) -> Self {
        Self {
            budget,
            preview_chars,
            notices: None,
        }
    }

    /// Attach a notice channel for an observer to render.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<Notice>) -> Self {
        self.notices = Some(tx);
        self
    }

    fn notify(&self, notice: Notice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }

    /// Consume the stream to completion.
    ///
    /// A closed channel without a final message yields the best partial
    /// text rather than an error.
    pub async fn process(&self, mut rx: mpsc::Receiver<StreamEvent>) -> StreamSummary {
        let mut buffer = String::new();
        let mut is_streaming = false;
        let mut final_text: Option<String> = None;
        let mut tool_count = 0usize;
        let mut labels: HashMap<String, String> = HashMap::new();

        // Each advisory fires at most once per run
        let mut warned = [false; 3];

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TokenDelta { text } => {
                    if !is_streaming {
                        // Display formatting only, never control flow
                        is_streaming = true;
                        self.notify(Notice::ResponseStarted);
                    }
                    buffer.push_str(&text);
                    self.notify(Notice::Token(text));
                }

                StreamEvent::ToolCallStarted { id, name } => {
                    tool_count += 1;
                    labels.insert(id, name.clone());
                    self.notify(Notice::ToolStarted {
                        seq: tool_count,
                        name,
                    });
                    self.check_budget(&mut warned);
                }

                StreamEvent::ToolCallFinished { id, name, preview } => {
                    let label = labels.get(&id).cloned().unwrap_or(name);
                    self.notify(Notice::ToolFinished {
                        name: label,
                        preview: truncate(&preview, self.preview_chars),
                    });
                }

                StreamEvent::AgentHandoff { agent } => {
                    self.notify(Notice::Handoff { agent });
                }

                StreamEvent::FinalMessage { text } => {
                    // Authoritative: overrides the display buffer
                    final_text = Some(text);
                }
            }
        }

        let interrupted = final_text.is_none();
        if interrupted {
            debug!(
                partial_len = buffer.len(),
                "Stream closed before a final message, returning partial text"
            );
        }

        StreamSummary {
            final_text: final_text.unwrap_or_else(|| buffer.clone()),
            streamed: buffer,
            tool_calls_seen: tool_count,
            interrupted,
        }
    }

    /// Emit budget advisories from the one authoritative counter. The
    /// dispatcher records calls before announcing them, so the counter is
    /// already up to date when the started event arrives.
    fn check_budget(&self, warned: &mut [bool; 3]) {
        let used = self.budget.used();
        let max_turns = self.budget.max_turns();
        match self.budget.mark_for(used) {
            Some(BudgetMark::Approaching) if !warned[0] => {
                warned[0] = true;
                self.notify(Notice::BudgetApproaching { used, max_turns });
            }
            Some(BudgetMark::Final) if !warned[1] => {
                warned[1] = true;
                self.notify(Notice::BudgetFinal { used, max_turns });
            }
            Some(BudgetMark::Exhausted) if !warned[2] => {
                warned[2] = true;
                self.notify(Notice::BudgetReached { used, max_turns });
            }
            _ => {}
        }
    }
}

/// Truncate display text on a char boundary, appending an ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}
