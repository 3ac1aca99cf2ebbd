//! Run controller: drives one execution from start to a [`RunOutcome`].

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use ideascope_agent::{AgentEvent, RunRequest, TaskEngine, ToolInvocation, ToolVerdict};
use ideascope_core::{
    AnalysisMode, ApprovalRequest, CheckpointId, RunBudget, RunFailure, RunOutcome, SessionId,
    TaskRun,
};

use crate::checkpoint::CheckpointCoordinator;
use crate::gate::{ApprovalGate, GateVerdict};
use crate::interceptor::{CallCounting, Interception, ToolCallInterceptor};

/// Everything needed to execute one run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Short description for logs and the run record.
    pub description: String,
    /// Full prompt sent to the engine.
    pub prompt: String,
    pub mode: AnalysisMode,
    pub budget: RunBudget,
    pub session_id: SessionId,
    pub model: Option<String>,
    /// Checkpoint to restore before starting.
    pub resume_from: Option<CheckpointId>,
    /// Progress reported by the run being resumed.
    pub previous_progress: u8,
    /// When false, gated tools run without asking.
    pub approval_required: bool,
}

/// How the event loop ended.
enum Exit {
    Drained,
    TimedOut,
    StreamFailed(String),
}

enum CallDecision {
    Resolve(ToolVerdict),
    Suspend(ApprovalRequest, Option<CheckpointId>),
}

pub struct RunController {
    engine: Arc<dyn TaskEngine>,
    checkpoints: CheckpointCoordinator,
    gate: ApprovalGate,
    counting: CallCounting,
}

impl RunController {
    pub fn new(
        engine: Arc<dyn TaskEngine>,
        checkpoints: CheckpointCoordinator,
        gate: ApprovalGate,
        counting: CallCounting,
    ) -> Self {
        Self {
            engine,
            checkpoints,
            gate,
            counting,
        }
    }

    /// Execute a run to completion, interruption, or suspension.
    ///
    /// Never returns an error: failures become [`RunOutcome::Failed`] or, when
    /// partial output or a checkpoint exists, [`RunOutcome::Interrupted`].
    /// The timeout is checked each time an event arrives.
    pub async fn execute(&self, spec: RunSpec) -> RunOutcome {
        if let Some(checkpoint_id) = &spec.resume_from {
            self.checkpoints.restore_best_effort(checkpoint_id).await;
        }

        let mut run = TaskRun::new(
            spec.description.clone(),
            spec.mode,
            spec.budget,
            spec.session_id.clone(),
        )
        .with_previous_progress(spec.previous_progress);

        info!(
            run_id = %run.id,
            session_id = %run.session_id,
            mode = %run.mode,
            max_tool_calls = run.budget.max_tool_calls,
            timeout_secs = run.budget.timeout.as_secs(),
            "Starting run"
        );

        let request = RunRequest {
            run_id: run.id.clone(),
            session_id: spec.session_id.clone(),
            prompt: spec.prompt.clone(),
            model: spec.model.clone(),
            max_iterations: spec.budget.max_iterations,
        };
        let started = Instant::now();
        let mut events = match self.engine.start_run(request).await {
            Ok(events) => events,
            Err(e) if e.is_conflict() => {
                warn!(run_id = %run.id, "Engine busy, rejecting run");
                return RunOutcome::Failed(RunFailure::busy("Server busy, retry later"));
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Failed to start run");
                return RunOutcome::Failed(RunFailure::engine(e.to_string()));
            }
        };

        let mut interceptor = ToolCallInterceptor::new(spec.budget.max_tool_calls, self.counting);
        // Last arguments per tool, for approvals raised from tool errors.
        let mut last_args: HashMap<String, Value> = HashMap::new();

        let exit = loop {
            let Some(event) = events.next().await else {
                break Exit::Drained;
            };
            if started.elapsed() >= spec.budget.timeout {
                warn!(
                    run_id = %run.id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Run timed out"
                );
                break Exit::TimedOut;
            }

            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!(run_id = %run.id, error = %e, "Event stream failed");
                    break Exit::StreamFailed(e.to_string());
                }
            };

            match event {
                AgentEvent::Message { text } => run.append_output(&text),
                AgentEvent::ToolUse(mut call) => {
                    match self
                        .on_tool_use(&spec, &mut run, &mut interceptor, &mut last_args, &call)
                        .await
                    {
                        CallDecision::Resolve(verdict) => {
                            debug!(run_id = %run.id, tool = %call.name, verdict = ?verdict, "Tool call resolved");
                            call.resolve(verdict);
                        }
                        CallDecision::Suspend(request, checkpoint_id) => {
                            call.resolve(ToolVerdict::skip("awaiting approval"));
                            return suspend(run, started, request, checkpoint_id);
                        }
                    }
                }
                AgentEvent::Error { message, tool_name } => {
                    let Some(tool) = tool_name else {
                        warn!(run_id = %run.id, message = %message, "Engine reported an error");
                        continue;
                    };
                    if spec.approval_required {
                        let args = last_args.get(&tool).cloned().unwrap_or(Value::Null);
                        if let Some(GateVerdict::Suspend {
                            request,
                            checkpoint_id,
                        }) = self
                            .gate
                            .check_error(&spec.session_id, &tool, &message, &args)
                        {
                            return suspend(run, started, request, checkpoint_id);
                        }
                    }
                    warn!(
                        run_id = %run.id,
                        tool = %tool,
                        message = %message,
                        "Tool execution failed, continuing"
                    );
                }
                AgentEvent::Other { kind } => {
                    trace!(run_id = %run.id, kind = %kind, "Ignoring event");
                }
            }
        };
        // Releases the engine before any checkpoint work.
        drop(events);

        let elapsed = started.elapsed();
        match exit {
            Exit::Drained if !run.interrupted => {
                info!(run_id = %run.id, tool_calls = run.tool_calls, "Run completed");
                RunOutcome::Completed(run.finish(elapsed))
            }
            Exit::Drained | Exit::TimedOut => {
                run.interrupt();
                self.save_partial(&mut run).await;
                info!(run_id = %run.id, tool_calls = run.tool_calls, "Run interrupted");
                RunOutcome::Interrupted(run.finish(elapsed))
            }
            Exit::StreamFailed(message) => {
                run.interrupt();
                self.save_partial(&mut run).await;
                if run.output.is_empty() && run.checkpoint_id.is_none() {
                    error!(run_id = %run.id, "Run failed with no recoverable state");
                    return RunOutcome::Failed(RunFailure::engine(message));
                }
                info!(run_id = %run.id, "Run interrupted by stream failure");
                RunOutcome::Interrupted(run.finish(elapsed))
            }
        }
    }

    /// Budget checks first, then the approval gate for gated tools.
    async fn on_tool_use(
        &self,
        spec: &RunSpec,
        run: &mut TaskRun,
        interceptor: &mut ToolCallInterceptor,
        last_args: &mut HashMap<String, Value>,
        call: &ToolInvocation,
    ) -> CallDecision {
        let interception = interceptor.intercept(&call.name, call.args.clone());
        run.tool_calls = interceptor.calls();
        if interceptor.budget_exceeded() {
            run.interrupt();
        }

        let (args, gated) = match interception {
            Interception::Skip { reason } => {
                return CallDecision::Resolve(ToolVerdict::Skip { reason });
            }
            Interception::Proceed { args, gated } => (args, gated),
        };
        last_args.insert(call.name.clone(), args.clone());

        let verdict = if gated && spec.approval_required {
            self.gate.check_call(&spec.session_id, &call.name, &args).await
        } else {
            GateVerdict::Execute
        };
        match verdict {
            GateVerdict::Execute => {
                interceptor.record_executed();
                run.tool_calls = interceptor.calls();
                CallDecision::Resolve(ToolVerdict::Execute { args })
            }
            GateVerdict::Skip { reason } => CallDecision::Resolve(ToolVerdict::Skip { reason }),
            GateVerdict::Suspend {
                request,
                checkpoint_id,
            } => CallDecision::Suspend(request, checkpoint_id),
        }
    }

    async fn save_partial(&self, run: &mut TaskRun) {
        if run.checkpoint_id.is_none() {
            run.checkpoint_id = self
                .checkpoints
                .try_create(&format!("partial-{}", run.id))
                .await;
        }
    }
}

fn suspend(
    mut run: TaskRun,
    started: Instant,
    request: ApprovalRequest,
    checkpoint_id: Option<CheckpointId>,
) -> RunOutcome {
    info!(
        run_id = %run.id,
        approval_id = %request.approval_id,
        tool = %request.tool_name,
        "Run suspended for approval"
    );
    run.checkpoint_id = checkpoint_id;
    RunOutcome::SuspendedForApproval(run.suspend(started.elapsed(), request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ideascope_agent::{ScriptStep, ScriptedEngine};
    use ideascope_core::{FailureKind, QuickLimits};
    use serde_json::json;

    use crate::approval::ApprovalStore;

    struct Harness {
        engine: Arc<ScriptedEngine>,
        store: Arc<ApprovalStore>,
        controller: RunController,
    }

    fn harness(counting: CallCounting) -> Harness {
        let engine = Arc::new(ScriptedEngine::new());
        let store = Arc::new(ApprovalStore::new(Duration::from_secs(3600)));
        let checkpoints = CheckpointCoordinator::new(engine.clone());
        let gate = ApprovalGate::new(store.clone(), checkpoints.clone());
        let controller = RunController::new(engine.clone(), checkpoints, gate, counting);
        Harness {
            engine,
            store,
            controller,
        }
    }

    fn spec(session: &str, mode: AnalysisMode, allow_web_tools: bool) -> RunSpec {
        RunSpec {
            description: "idea".to_string(),
            prompt: "Analyze the idea".to_string(),
            mode,
            budget: RunBudget::for_mode(mode, &QuickLimits::default(), allow_web_tools),
            session_id: SessionId::new(session),
            model: None,
            resume_from: None,
            previous_progress: 0,
            approval_required: true,
        }
    }

    fn quick(session: &str) -> RunSpec {
        spec(session, AnalysisMode::Quick, true)
    }

    #[tokio::test]
    async fn test_completed_run_reports_full_progress() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::message("Hello "),
            ScriptStep::tool("calculator", json!({"expr": "1+1"})),
            ScriptStep::message("world"),
        ]);

        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result.text, "Hello world");
        assert!(!result.interrupted);
        assert_eq!(result.progress, 100);
        assert_eq!(h.engine.executed_tools(), vec!["calculator"]);
    }

    #[tokio::test]
    async fn test_budget_overrun_interrupts_and_drains() {
        let h = harness(CallCounting::EveryCall);
        let mut script: Vec<_> = (0..7)
            .map(|i| ScriptStep::tool("calculator", json!({ "n": i })))
            .collect();
        script.push(ScriptStep::message("closing words"));
        h.engine.push_script(script);

        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Interrupted(result) = outcome else {
            panic!("expected interruption, got {outcome:?}");
        };
        assert!(result.interrupted);
        assert_eq!(result.progress, 95);
        assert_eq!(result.text, "closing words");
        assert!(result.checkpoint_id.is_some());
        assert_eq!(h.engine.executed_tools().len(), 5);
        assert_eq!(h.engine.skipped_tools().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_skips_every_call_without_interrupting() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::tool("web_search", json!({"query": "a"})),
            ScriptStep::tool("calculator", json!({})),
            ScriptStep::message("done"),
        ]);

        let outcome = h
            .controller
            .execute(spec("s1", AnalysisMode::Deep, false))
            .await;
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert!(!result.interrupted);
        assert!(h.engine.executed_tools().is_empty());
        assert_eq!(h.engine.skipped_tools(), vec!["web_search", "calculator"]);
        assert_eq!(h.store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_progress_is_time_based() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::message("partial"),
            ScriptStep::sleep_secs(30),
            ScriptStep::Fail("model crashed".to_string()),
        ]);
        let mut run = spec("s1", AnalysisMode::Quick, false);
        run.previous_progress = 10;

        let outcome = h.controller.execute(run).await;
        let RunOutcome::Interrupted(result) = outcome else {
            panic!("expected interruption, got {outcome:?}");
        };
        // 10 carried over + 30s of a 120s timeout
        assert_eq!(result.progress, 35);
        assert_eq!(result.text, "partial");
        assert!(result.checkpoint_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_consuming() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::message("early"),
            ScriptStep::sleep_secs(121),
            ScriptStep::message(" late"),
            ScriptStep::tool("calculator", json!({})),
        ]);

        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Interrupted(result) = outcome else {
            panic!("expected interruption, got {outcome:?}");
        };
        assert_eq!(result.text, "early");
        assert!(result.interrupted);
        assert!(result.progress <= 95);
        assert!(result.checkpoint_id.is_some());
        assert!(h.engine.executed_tools().is_empty());
    }

    #[tokio::test]
    async fn test_first_gated_call_suspends() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::message("Researching"),
            ScriptStep::tool("web_search", json!({"query": "market size"})),
            ScriptStep::message("never seen"),
        ]);

        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::SuspendedForApproval(result) = outcome else {
            panic!("expected suspension, got {outcome:?}");
        };
        let approval = result.approval.as_ref().unwrap();
        assert!(result.needs_approval());
        assert!(result.interrupted);
        assert!(result.progress < 100);
        assert!(!approval.approval_id.as_str().is_empty());
        assert_eq!(approval.tool_name, "web_search");
        assert_eq!(approval.tool_args, json!({"query": "market size"}));
        assert_eq!(approval.session_id, SessionId::new("s1"));
        assert!(result.checkpoint_id.is_some());
        assert_eq!(result.text, "Researching");
        assert_eq!(h.store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_repeat_before_decision_reuses_approval() {
        let h = harness(CallCounting::EveryCall);
        for _ in 0..2 {
            h.engine
                .push_script(vec![ScriptStep::tool("web_search", json!({"query": "q"}))]);
        }

        let first = h.controller.execute(quick("s1")).await;
        let second = h.controller.execute(quick("s1")).await;
        let first_id = &first.result().unwrap().approval.as_ref().unwrap().approval_id;
        let second_id = &second.result().unwrap().approval.as_ref().unwrap().approval_id;
        assert_eq!(first_id, second_id);
        assert_eq!(h.store.pending_count(), 1);
        assert_eq!(h.engine.checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_tool_is_skipped_and_run_drains() {
        let h = harness(CallCounting::EveryCall);
        h.engine
            .push_script(vec![ScriptStep::tool("web_search", json!({"query": "q"}))]);
        let suspended = h.controller.execute(quick("s1")).await;
        let approval_id = suspended.result().unwrap().approval.as_ref().unwrap().approval_id.clone();
        h.store.decide(&approval_id, false, None).unwrap();

        h.engine.push_script(vec![
            ScriptStep::tool("web_search", json!({"query": "q"})),
            ScriptStep::message("wrote it without search"),
        ]);
        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result.text, "wrote it without search");
        assert!(!result.needs_approval());
        assert_eq!(h.store.pending_count(), 0);
        assert!(h.engine.executed_tools().is_empty());
        assert!(h.engine.skipped_tools().contains(&"web_search".to_string()));
    }

    #[tokio::test]
    async fn test_approved_tool_runs_with_corrected_args() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![ScriptStep::tool(
            "web_search",
            json!({"query": "q", "sources": ["web"]}),
        )]);
        let suspended = h.controller.execute(quick("s1")).await;
        let request = suspended.result().unwrap().approval.clone().unwrap();
        assert_eq!(request.tool_args, json!({"query": "q", "sources": [{"type": "web"}]}));
        h.store.decide(&request.approval_id, true, None).unwrap();

        h.engine.push_script(vec![ScriptStep::tool(
            "web_search",
            json!({"query": "q", "sources": ["web"]}),
        )]);
        let outcome = h.controller.execute(quick("s1")).await;
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(
            h.engine.executed_calls(),
            vec![(
                "web_search".to_string(),
                json!({"query": "q", "sources": [{"type": "web"}]})
            )]
        );
    }

    #[tokio::test]
    async fn test_approval_not_required_bypasses_gate() {
        let h = harness(CallCounting::EveryCall);
        h.engine
            .push_script(vec![ScriptStep::tool("web_fetch", json!({"url": "https://a"}))]);
        let mut run = quick("s1");
        run.approval_required = false;

        assert!(matches!(
            h.controller.execute(run).await,
            RunOutcome::Completed(_)
        ));
        assert_eq!(h.engine.executed_tools(), vec!["web_fetch"]);
        assert_eq!(h.store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_gated_tool_error_suspends_without_checkpoint() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::tool_error("web_search", "invalid_type: expected object at sources[0]"),
            ScriptStep::message("never seen"),
        ]);

        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::SuspendedForApproval(result) = outcome else {
            panic!("expected suspension, got {outcome:?}");
        };
        assert_eq!(result.approval.unwrap().tool_name, "web_search");
        assert!(result.checkpoint_id.is_none());
        assert_eq!(h.engine.checkpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_tool_error_is_logged_and_skipped() {
        let h = harness(CallCounting::EveryCall);
        h.engine.push_script(vec![
            ScriptStep::tool_error("calculator", "division by zero"),
            ScriptStep::message("recovered"),
        ]);
        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(result.text, "recovered");
    }

    #[tokio::test]
    async fn test_conflict_maps_to_busy() {
        let h = harness(CallCounting::EveryCall);
        h.engine.set_conflict(true);
        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.kind, FailureKind::Busy);
    }

    #[tokio::test]
    async fn test_stream_failure_without_state_fails() {
        let h = harness(CallCounting::EveryCall);
        h.engine.set_fail_checkpoints(true);
        h.engine
            .push_script(vec![ScriptStep::Fail("engine crashed".to_string())]);
        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.kind, FailureKind::Engine);
        assert!(failure.message.contains("engine crashed"));
    }

    #[tokio::test]
    async fn test_stream_failure_with_output_is_partial() {
        let h = harness(CallCounting::EveryCall);
        h.engine.set_fail_checkpoints(true);
        h.engine.push_script(vec![
            ScriptStep::message("half a report"),
            ScriptStep::Fail("engine crashed".to_string()),
        ]);
        let outcome = h.controller.execute(quick("s1")).await;
        let RunOutcome::Interrupted(result) = outcome else {
            panic!("expected interruption, got {outcome:?}");
        };
        assert_eq!(result.text, "half a report");
        assert!(result.checkpoint_id.is_none());
    }

    #[tokio::test]
    async fn test_resume_restores_checkpoint_best_effort() {
        let h = harness(CallCounting::EveryCall);
        let checkpoints = CheckpointCoordinator::new(h.engine.clone());
        let checkpoint = checkpoints.create("before").await.unwrap();

        h.engine.push_script(vec![ScriptStep::message("resumed")]);
        let mut run = quick("s1");
        run.resume_from = Some(checkpoint.id.clone());
        assert!(matches!(h.controller.execute(run).await, RunOutcome::Completed(_)));
        assert_eq!(h.engine.restored(), vec![checkpoint.id]);

        h.engine.push_script(vec![ScriptStep::message("fresh")]);
        let mut run = quick("s1");
        run.resume_from = Some(CheckpointId::new("missing"));
        let outcome = h.controller.execute(run).await;
        assert_eq!(outcome.result().unwrap().text, "fresh");
    }

    #[tokio::test]
    async fn test_failed_restore_starts_fresh() {
        let h = harness(CallCounting::EveryCall);
        let checkpoints = CheckpointCoordinator::new(h.engine.clone());
        let checkpoint = checkpoints.create("before").await.unwrap();
        h.engine.set_fail_restore(true);

        h.engine.push_script(vec![ScriptStep::message("fresh start")]);
        let mut run = quick("s1");
        run.resume_from = Some(checkpoint.id);
        let outcome = h.controller.execute(run).await;

        let RunOutcome::Completed(result) = outcome else {
            panic!("expected a completed run, got {outcome:?}");
        };
        assert_eq!(result.text, "fresh start");
        assert!(h.engine.restored().is_empty());
        assert_eq!(h.engine.runs().len(), 1);
    }

    fn rejected_then_calculator(h: &Harness) {
        h.engine.push_script(vec![
            ScriptStep::tool("web_search", json!({})),
            ScriptStep::tool("calculator", json!({})),
        ]);
    }

    async fn reject_web_search(h: &Harness) {
        h.engine
            .push_script(vec![ScriptStep::tool("web_search", json!({}))]);
        let mut run = quick("s1");
        run.budget.max_tool_calls = 1;
        let suspended = h.controller.execute(run).await;
        let approval_id = suspended.result().unwrap().approval.as_ref().unwrap().approval_id.clone();
        h.store.decide(&approval_id, false, None).unwrap();
    }

    #[tokio::test]
    async fn test_every_call_counts_rejected_calls() {
        let h = harness(CallCounting::EveryCall);
        reject_web_search(&h).await;
        rejected_then_calculator(&h);
        let mut run = quick("s1");
        run.budget.max_tool_calls = 1;

        let outcome = h.controller.execute(run).await;
        assert!(matches!(outcome, RunOutcome::Interrupted(_)));
        assert!(h.engine.executed_tools().is_empty());
    }

    #[tokio::test]
    async fn test_executed_only_ignores_rejected_calls() {
        let h = harness(CallCounting::ExecutedOnly);
        reject_web_search(&h).await;
        rejected_then_calculator(&h);
        let mut run = quick("s1");
        run.budget.max_tool_calls = 1;

        let outcome = h.controller.execute(run).await;
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(h.engine.executed_tools(), vec!["calculator"]);
    }
}
