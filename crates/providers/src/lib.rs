//! Model-facing client implementations for Stringer.
//!
//! Implements the `stringer_core::ModelClient` trait:
//! - [`openai::OpenAiCompatModel`] — OpenAI-compatible HTTP backends with
//!   SSE streaming and tool calling
//! - [`scripted::ScriptedModel`] — deterministic playback for tests and
//!   offline runs

pub mod openai;
pub mod router;
pub mod scripted;

pub use openai::OpenAiCompatModel;
pub use router::{ModelRouter, build_from_config};
pub use scripted::ScriptedModel;
