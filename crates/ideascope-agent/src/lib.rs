//! Task-execution engine boundary for ideascope.
//!
//! This crate defines what the run controller needs from the model/tool
//! runtime: a [`TaskEngine`] that starts an execution and yields a typed
//! [`EventStream`], and a [`CheckpointBackend`] that snapshots and restores
//! execution state. Tool calls arrive as [`AgentEvent::ToolUse`] and wait for
//! the consumer's [`ToolVerdict`], so the controller decides what executes.
//!
//! [`ClaudeEngine`] drives the Claude Code CLI over its stream-json control
//! protocol. With the `testing` feature, `ScriptedEngine` replays canned
//! events instead.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use ideascope_agent::{AgentEvent, ClaudeEngine, RunRequest, TaskEngine, ToolVerdict};
//! use ideascope_core::{RunId, SessionId};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ClaudeEngine::new("claude");
//!     let mut events = engine
//!         .start_run(RunRequest {
//!             run_id: RunId::generate(),
//!             session_id: SessionId::new("s1"),
//!             prompt: "What is 2 + 2?".to_string(),
//!             model: None,
//!             max_iterations: 5,
//!         })
//!         .await?;
//!
//!     while let Some(event) = events.next().await {
//!         match event? {
//!             AgentEvent::Message { text } => print!("{text}"),
//!             AgentEvent::ToolUse(mut call) => call.resolve(ToolVerdict::skip("no tools")),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod event;
mod executor;
mod protocol;
#[cfg(feature = "testing")]
mod scripted;
mod types;

pub use engine::{
    event_channel, CheckpointBackend, EventStream, RunRequest, RunSlot, SlotGuard, TaskEngine,
};
pub use error::EngineError;
pub use event::{
    normalize_tool_args, AgentEvent, RawEvent, ToolInvocation, ToolVerdict, TOOL_ARG_FIELDS,
    TOOL_NAME_FIELDS,
};
pub use executor::ClaudeEngine;
#[cfg(feature = "testing")]
pub use scripted::{EngineLog, RunRecord, ScriptStep, ScriptedEngine};
pub use types::{ClaudeMessage, ContentItem, ControlRequest, PermissionResult};
