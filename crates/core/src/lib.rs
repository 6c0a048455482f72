//! # Stringer Core
//!
//! Domain types, traits, and error definitions for the Stringer research
//! agent runtime. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping backends (model, search) via configuration
//! - Easy testing with scripted/static implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod budget;
pub mod error;
pub mod event;
pub mod model;
pub mod search;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use budget::{BudgetMark, TurnBudget};
pub use error::{Error, ModelError, Result, SearchError, ToolError, TranscriptError};
pub use event::{DomainEvent, EventBus};
pub use model::{ModelChunk, ModelClient, ModelRequest, ModelStep, StreamEvent, ToolSchema};
pub use search::{Depth, SearchClient, SearchItem, SearchQuery};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolRegistry, ToolResult};
pub use transcript::{Entry, Session, SessionId, Transcript};
