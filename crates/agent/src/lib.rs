//! The turn-loop orchestration engine — the heart of Stringer.
//!
//! One **turn** is a full round of "ask model → dispatch resulting tool
//! calls → merge results", repeated until the model answers in text, the
//! turn budget runs out, or the run is cancelled:
//!
//! 1. **Send** the transcript and tool schemas to the model
//! 2. **If tool calls**: dispatch them — independent calls concurrently
//!    under the semaphore cap, tighten-and-retry chains serially — and
//!    merge the results back in emission order
//! 3. **If text only**: the turn is complete
//! 4. **If the budget is spent**: force one tool-free summarization call
//!
//! A streaming run additionally emits [`StreamEvent`]s consumed by the
//! [`StreamProcessor`], which projects them into display notices and the
//! final text.
//!
//! [`StreamEvent`]: stringer_core::model::StreamEvent

pub mod briefing;
pub mod loop_runner;
pub mod stream;

pub use briefing::{BriefingOptions, research_briefing};
pub use loop_runner::{CancelHandle, TerminationReason, TurnLoop, TurnOutcome};
pub use stream::{Notice, StreamProcessor, StreamSummary};
