//! Deterministic in-process engine.
//!
//! Plays back scripted events, records which tool calls were executed or
//! skipped, and keeps checkpoints in memory. Used to test the run controller
//! without a model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use ideascope_core::{Checkpoint, CheckpointId, RunId, SessionId};

use crate::engine::{event_channel, CheckpointBackend, EventStream, RunRequest, RunSlot, TaskEngine};
use crate::error::EngineError;
use crate::event::{AgentEvent, RawEvent, ToolInvocation, ToolVerdict};

/// One step of a script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a raw `{type: ...}` event.
    Event(Value),
    /// Wait before the next step.
    Sleep(Duration),
    /// End the stream with an error.
    Fail(String),
}

impl ScriptStep {
    pub fn message(text: &str) -> Self {
        Self::Event(json!({"type": "message", "text": text}))
    }

    pub fn tool(name: &str, args: Value) -> Self {
        Self::Event(json!({"type": "tool_use", "name": name, "args": args}))
    }

    pub fn tool_error(name: &str, message: &str) -> Self {
        Self::Event(json!({"type": "error", "toolName": name, "message": message}))
    }

    pub fn sleep_secs(secs: u64) -> Self {
        Self::Sleep(Duration::from_secs(secs))
    }
}

/// What happened during one scripted run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: RunId,
    pub session_id: SessionId,
    pub prompt: String,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

/// Everything the engine observed.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub runs: Vec<RunRecord>,
    /// Executed tool calls with the arguments they ran with.
    pub executed: Vec<(String, Value)>,
    pub skipped: Vec<String>,
    pub restored: Vec<CheckpointId>,
}

/// Engine that replays queued scripts, one per run.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    slot: RunSlot,
    log: Arc<Mutex<EngineLog>>,
    checkpoints: Mutex<Vec<Checkpoint>>,
    tools: Vec<String>,
    conflict: AtomicBool,
    fail_checkpoints: AtomicBool,
    fail_restore: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Queue the script for the next run that has none yet.
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        lock(&self.scripts).push_back(steps);
    }

    /// Make `start_run` report a concurrency conflict.
    pub fn set_conflict(&self, conflict: bool) {
        self.conflict.store(conflict, Ordering::SeqCst);
    }

    pub fn set_fail_checkpoints(&self, fail: bool) {
        self.fail_checkpoints.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    pub fn executed_tools(&self) -> Vec<String> {
        lock(&self.log).executed.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn executed_calls(&self) -> Vec<(String, Value)> {
        lock(&self.log).executed.clone()
    }

    pub fn skipped_tools(&self) -> Vec<String> {
        lock(&self.log).skipped.clone()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        lock(&self.log).runs.clone()
    }

    pub fn restored(&self) -> Vec<CheckpointId> {
        lock(&self.log).restored.clone()
    }

    pub fn checkpoint_count(&self) -> usize {
        lock(&self.checkpoints).len()
    }
}

#[async_trait]
impl TaskEngine for ScriptedEngine {
    async fn start_run(&self, request: RunRequest) -> Result<EventStream, EngineError> {
        if self.conflict.load(Ordering::SeqCst) {
            return Err(EngineError::ConcurrencyConflict);
        }
        let guard = self.slot.try_acquire()?;
        let steps = lock(&self.scripts).pop_front().unwrap_or_default();

        let run_index = {
            let mut log = lock(&self.log);
            log.runs.push(RunRecord {
                run_id: request.run_id.clone(),
                session_id: request.session_id.clone(),
                prompt: request.prompt.clone(),
                started_at: Instant::now(),
                finished_at: None,
            });
            log.runs.len() - 1
        };

        let (tx, stream) = event_channel(guard);
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            for step in steps {
                match step {
                    ScriptStep::Sleep(duration) => {
                        tokio::select! {
                            _ = tokio::time::sleep(duration) => {}
                            _ = tx.closed() => break,
                        }
                    }
                    ScriptStep::Fail(message) => {
                        let _ = tx.send(Err(EngineError::Execution(message))).await;
                        break;
                    }
                    ScriptStep::Event(value) => {
                        let sent = match RawEvent::from_value(&value) {
                            RawEvent::ToolUse {
                                call_id,
                                name,
                                args,
                            } => {
                                let (invocation, verdict_rx) =
                                    ToolInvocation::new(call_id, name.clone(), args);
                                if tx.send(Ok(AgentEvent::ToolUse(invocation))).await.is_err() {
                                    break;
                                }
                                let verdict = verdict_rx
                                    .await
                                    .unwrap_or_else(|_| ToolVerdict::skip("no verdict"));
                                let mut record = lock(&log);
                                match verdict {
                                    ToolVerdict::Execute { args } => record.executed.push((name, args)),
                                    ToolVerdict::Skip { .. } => record.skipped.push(name),
                                }
                                true
                            }
                            RawEvent::Message { text } => {
                                tx.send(Ok(AgentEvent::Message { text })).await.is_ok()
                            }
                            RawEvent::Error { message, tool_name } => tx
                                .send(Ok(AgentEvent::Error { message, tool_name }))
                                .await
                                .is_ok(),
                            RawEvent::Other { kind } => {
                                tx.send(Ok(AgentEvent::Other { kind })).await.is_ok()
                            }
                        };
                        if !sent {
                            break;
                        }
                    }
                }
            }
            if let Some(run) = lock(&log).runs.get_mut(run_index) {
                run.finished_at = Some(Instant::now());
            }
        });

        Ok(stream)
    }

    async fn list_tools(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.tools.clone())
    }
}

#[async_trait]
impl CheckpointBackend for ScriptedEngine {
    async fn create(&self, name: &str) -> Result<Checkpoint, EngineError> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(EngineError::Checkpoint("snapshot storage unavailable".to_string()));
        }
        let checkpoint = Checkpoint::new(name);
        lock(&self.checkpoints).push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, EngineError> {
        Ok(lock(&self.checkpoints).clone())
    }

    async fn restore(&self, id: &CheckpointId) -> Result<(), EngineError> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(EngineError::Checkpoint("restore failed".to_string()));
        }
        if !lock(&self.checkpoints).iter().any(|c| &c.id == id) {
            return Err(EngineError::CheckpointNotFound(id.to_string()));
        }
        lock(&self.log).restored.push(id.clone());
        Ok(())
    }

    async fn delete(&self, id: &CheckpointId) -> Result<bool, EngineError> {
        let mut checkpoints = lock(&self.checkpoints);
        let before = checkpoints.len();
        checkpoints.retain(|c| &c.id != id);
        Ok(checkpoints.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn request() -> RunRequest {
        RunRequest {
            run_id: RunId::generate(),
            session_id: SessionId::new("s1"),
            prompt: "idea".to_string(),
            model: None,
            max_iterations: 20,
        }
    }

    #[tokio::test]
    async fn test_replays_script_and_records_verdicts() {
        let engine = ScriptedEngine::new();
        engine.push_script(vec![
            ScriptStep::message("thinking"),
            ScriptStep::tool("web_search", json!({"query": "a"})),
            ScriptStep::tool("calculator", json!({})),
        ]);

        let mut stream = engine.start_run(request()).await.unwrap();
        let mut kinds = Vec::new();
        while let Some(event) = stream.next().await {
            let event = event.unwrap();
            kinds.push(event.kind().to_string());
            if let AgentEvent::ToolUse(mut call) = event {
                let verdict = if call.name == "web_search" {
                    ToolVerdict::Execute {
                        args: call.args.clone(),
                    }
                } else {
                    ToolVerdict::skip("no")
                };
                call.resolve(verdict);
            }
        }

        assert_eq!(kinds, vec!["message", "tool_use", "tool_use"]);
        assert_eq!(engine.executed_tools(), vec!["web_search"]);
        assert_eq!(engine.skipped_tools(), vec!["calculator"]);
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_stream_alive() {
        let engine = ScriptedEngine::new();
        engine.push_script(vec![ScriptStep::sleep_secs(1)]);
        let stream = engine.start_run(request()).await.unwrap();
        assert!(matches!(
            engine.start_run(request()).await,
            Err(EngineError::ConcurrencyConflict)
        ));
        drop(stream);
        assert!(engine.start_run(request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_step_yields_error() {
        let engine = ScriptedEngine::new();
        engine.push_script(vec![ScriptStep::message("a"), ScriptStep::Fail("boom".into())]);
        let mut stream = engine.start_run(request()).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(AgentEvent::Message { .. }))));
        assert!(matches!(stream.next().await, Some(Err(EngineError::Execution(_)))));
        assert!(stream.next().await.is_none());
    }
}
