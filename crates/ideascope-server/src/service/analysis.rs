//! Analysis submissions: budgets, prompts, auto-continue, and report storage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use ideascope_core::{
    AnalysisOptions, ApprovalId, CheckpointId, FailureKind, QuickLimits, Report, ReportId,
    RunBudget, RunFailure, RunOutcome, SessionId,
};

use super::prompt::build_prompt;
use crate::config::Config;
use crate::controller::RunSpec;
use crate::reports::ReportStore;
use crate::scheduler::{RunScheduler, SchedulerError};

/// Characters of the idea used as the run description.
const DESCRIPTION_CHARS: usize = 80;

/// A file attached to a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
}

/// One analysis submission.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub idea: String,
    pub options: AnalysisOptions,
    pub sources: Vec<SourceDocument>,
    /// Generated when absent.
    pub session_id: Option<SessionId>,
    pub resume_checkpoint_id: Option<CheckpointId>,
    pub previous_progress: u8,
}

/// What a caller gets back for a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub report_id: ReportId,
    pub session_id: SessionId,
    pub report: String,
    pub interrupted: bool,
    pub progress: u8,
    pub checkpoint_id: Option<CheckpointId>,
    pub needs_approval: bool,
    pub approval_id: Option<ApprovalId>,
    pub tool_name: Option<String>,
    pub tool_args: Option<Value>,
}

impl AnalysisResponse {
    pub fn from_report(report: &Report) -> Self {
        let approval = report.result.approval.as_ref();
        Self {
            report_id: report.id.clone(),
            session_id: report.session_id.clone(),
            report: report.result.text.clone(),
            interrupted: report.result.interrupted,
            progress: report.result.progress,
            checkpoint_id: report.result.checkpoint_id.clone(),
            needs_approval: approval.is_some(),
            approval_id: approval.map(|a| a.approval_id.clone()),
            tool_name: approval.map(|a| a.tool_name.clone()),
            tool_args: approval.map(|a| a.tool_args.clone()),
        }
    }
}

/// Analysis errors.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Report not found: {0}")]
    ReportNotFound(ReportId),

    /// The engine is occupied. Retry later.
    #[error("{0}")]
    Busy(String),

    /// The run failed. Carries whatever partial state exists.
    #[error("Analysis failed: {message}")]
    Engine {
        message: String,
        partial_report: String,
        checkpoint_id: Option<CheckpointId>,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Check the response contract and log each violation. Never fails.
pub fn validate_contract(response: &AnalysisResponse) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if response.needs_approval {
        if response
            .approval_id
            .as_ref()
            .map_or(true, |id| id.as_str().is_empty())
        {
            violations.push("needsApproval without approvalId");
        }
        if response.tool_name.as_deref().map_or(true, str::is_empty) {
            violations.push("needsApproval without toolName");
        }
    }
    if response.interrupted && response.progress >= 100 {
        violations.push("interrupted result reports full progress");
    }
    if !response.interrupted && response.progress != 100 {
        violations.push("completed result reports partial progress");
    }

    for violation in &violations {
        warn!(report_id = %response.report_id, violation = %violation, "Result contract violated");
    }
    violations
}

pub struct AnalysisService {
    scheduler: RunScheduler,
    reports: Arc<ReportStore>,
    quick: QuickLimits,
    default_model: Option<String>,
    max_auto_continues: u32,
}

impl AnalysisService {
    pub fn new(scheduler: RunScheduler, reports: Arc<ReportStore>, config: &Config) -> Self {
        Self {
            scheduler,
            reports,
            quick: config.quick,
            default_model: config.default_model.clone(),
            max_auto_continues: config.max_auto_continues,
        }
    }

    /// Run an analysis and store the report, complete or partial.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let idea = request.idea.trim();
        if idea.is_empty() {
            return Err(AnalysisError::InvalidInput("idea must not be empty".to_string()));
        }

        let options = request.options.clone();
        let session_id = request.session_id.clone().unwrap_or_else(SessionId::generate);
        let budget = RunBudget::for_mode(options.mode, &self.quick, options.allow_web_tools);
        let model = options.model.clone().or_else(|| self.default_model.clone());
        let description: String = idea.chars().take(DESCRIPTION_CHARS).collect();

        let mut resume_from = request.resume_checkpoint_id.clone();
        let mut previous_progress = request.previous_progress;
        let mut text = String::new();
        let mut rounds = 0;

        let result = loop {
            let spec = RunSpec {
                description: description.clone(),
                prompt: build_prompt(idea, &options, &request.sources, resume_from.is_some()),
                mode: options.mode,
                budget,
                session_id: session_id.clone(),
                model: model.clone(),
                resume_from: resume_from.clone(),
                previous_progress,
                approval_required: options.approval_required,
            };
            let outcome = self.scheduler.submit(spec).await?;
            info!(session_id = %session_id, outcome = outcome.label(), round = rounds, "Run finished");

            let continuable =
                matches!(&outcome, RunOutcome::Interrupted(r) if r.checkpoint_id.is_some());
            let mut result = match outcome.into_result() {
                Ok(result) => result,
                Err(failure) => return Err(failed(failure, text, resume_from)),
            };

            if !text.is_empty() && !result.text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&result.text);

            if options.auto_continue && continuable && rounds < self.max_auto_continues {
                rounds += 1;
                info!(
                    session_id = %session_id,
                    round = rounds,
                    progress = result.progress,
                    "Auto-continuing interrupted run"
                );
                resume_from = result.checkpoint_id.clone();
                previous_progress = result.progress;
                continue;
            }

            result.text = text;
            break result;
        };

        let report = Report::new(idea, session_id, options, result);
        let response = AnalysisResponse::from_report(&report);
        validate_contract(&response);
        self.reports.insert(report).await;
        Ok(response)
    }

    /// Run a stored report's idea again with the same options under a new
    /// session. The result is stored as a new report.
    pub async fn reanalyze(&self, id: &ReportId) -> Result<AnalysisResponse, AnalysisError> {
        let report = self
            .reports
            .get(id)
            .await
            .ok_or_else(|| AnalysisError::ReportNotFound(id.clone()))?;
        info!(report_id = %id, "Reanalyzing report");
        self.analyze(AnalysisRequest {
            idea: report.idea,
            options: report.options,
            ..AnalysisRequest::default()
        })
        .await
    }
}

fn failed(
    failure: RunFailure,
    mut partial_report: String,
    last_checkpoint: Option<CheckpointId>,
) -> AnalysisError {
    match failure.kind {
        FailureKind::Busy => AnalysisError::Busy(failure.message),
        FailureKind::Engine => {
            partial_report.push_str(&failure.partial_text);
            AnalysisError::Engine {
                message: failure.message,
                partial_report,
                checkpoint_id: failure.checkpoint_id.or(last_checkpoint),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ideascope_agent::{ScriptStep, ScriptedEngine};
    use ideascope_core::AnalysisMode;
    use serde_json::json;

    use crate::approval::ApprovalStore;
    use crate::checkpoint::CheckpointCoordinator;
    use crate::controller::RunController;
    use crate::gate::ApprovalGate;

    fn service(engine: Arc<ScriptedEngine>, config: Config) -> (AnalysisService, Arc<ReportStore>) {
        let checkpoints = CheckpointCoordinator::new(engine.clone());
        let store = Arc::new(ApprovalStore::new(Duration::from_secs(3600)));
        let gate = ApprovalGate::new(store, checkpoints.clone());
        let controller = RunController::new(engine, checkpoints, gate, config.call_counting);
        let scheduler = RunScheduler::spawn(Arc::new(controller), 8);
        let reports = Arc::new(ReportStore::new());
        (AnalysisService::new(scheduler, reports.clone(), &config), reports)
    }

    fn request(idea: &str) -> AnalysisRequest {
        AnalysisRequest {
            idea: idea.to_string(),
            ..AnalysisRequest::default()
        }
    }

    fn tight_config(max_tool_calls: u32, max_auto_continues: u32) -> Config {
        let mut config = Config::default();
        config.quick.max_tool_calls = max_tool_calls;
        config.max_auto_continues = max_auto_continues;
        config
    }

    #[tokio::test]
    async fn test_analyze_stores_report() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_script(vec![ScriptStep::message("A solid idea.")]);
        let (service, reports) = service(engine.clone(), Config::default());

        let response = service.analyze(request("A bike-sharing app")).await.unwrap();
        assert_eq!(response.report, "A solid idea.");
        assert!(!response.interrupted);
        assert_eq!(response.progress, 100);
        assert!(!response.needs_approval);
        assert!(!response.session_id.as_str().is_empty());

        let stored = reports.get(&response.report_id).await.unwrap();
        assert_eq!(stored.idea, "A bike-sharing app");
        assert!(engine.runs()[0].prompt.contains("A bike-sharing app"));
    }

    #[tokio::test]
    async fn test_empty_idea_rejected() {
        let engine = Arc::new(ScriptedEngine::new());
        let (service, _) = service(engine, Config::default());
        assert!(matches!(
            service.analyze(request("   ")).await,
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_busy_engine() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.set_conflict(true);
        let (service, reports) = service(engine, Config::default());
        assert!(matches!(
            service.analyze(request("idea")).await,
            Err(AnalysisError::Busy(_))
        ));
        assert_eq!(reports.count().await, 0);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_partial_state() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.set_fail_checkpoints(true);
        engine.push_script(vec![ScriptStep::Fail("model unavailable".to_string())]);
        let (service, _) = service(engine, Config::default());

        let err = service.analyze(request("idea")).await.unwrap_err();
        let AnalysisError::Engine {
            message,
            partial_report,
            checkpoint_id,
        } = err
        else {
            panic!("expected engine failure");
        };
        assert!(message.contains("model unavailable"));
        assert!(partial_report.is_empty());
        assert!(checkpoint_id.is_none());
    }

    #[tokio::test]
    async fn test_suspension_returns_approval_fields() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_script(vec![ScriptStep::tool("web_search", json!({"query": "q"}))]);
        let (service, _) = service(engine, Config::default());

        let mut req = request("idea");
        req.session_id = Some(SessionId::new("s1"));
        req.options.auto_continue = true;
        let response = service.analyze(req).await.unwrap();

        assert!(response.needs_approval);
        assert_eq!(response.session_id, SessionId::new("s1"));
        assert!(response.approval_id.is_some());
        assert_eq!(response.tool_name.as_deref(), Some("web_search"));
        assert_eq!(response.tool_args, Some(json!({"query": "q"})));
        assert!(response.checkpoint_id.is_some());
        assert!(validate_contract(&response).is_empty());
    }

    #[tokio::test]
    async fn test_auto_continue_resumes_from_checkpoint() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_script(vec![
            ScriptStep::message("part one"),
            ScriptStep::tool("calculator", json!({})),
            ScriptStep::tool("calculator", json!({})),
        ]);
        engine.push_script(vec![ScriptStep::message("part two")]);
        let (service, _) = service(engine.clone(), tight_config(1, 3));

        let mut req = request("idea");
        req.options.auto_continue = true;
        let response = service.analyze(req).await.unwrap();

        assert!(!response.interrupted);
        assert_eq!(response.progress, 100);
        assert_eq!(response.report, "part one\n\npart two");

        let runs = engine.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].session_id, runs[1].session_id);
        assert!(runs[1].prompt.starts_with("Continue the analysis"));
        assert_eq!(engine.restored().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_continue_stops_after_max_rounds() {
        let engine = Arc::new(ScriptedEngine::new());
        for _ in 0..3 {
            engine.push_script(vec![
                ScriptStep::tool("calculator", json!({})),
                ScriptStep::tool("calculator", json!({})),
            ]);
        }
        let (service, _) = service(engine.clone(), tight_config(1, 1));

        let mut req = request("idea");
        req.options.auto_continue = true;
        let response = service.analyze(req).await.unwrap();

        assert!(response.interrupted);
        assert!(response.progress <= 95);
        assert!(response.checkpoint_id.is_some());
        assert_eq!(engine.runs().len(), 2);
    }

    #[tokio::test]
    async fn test_reanalyze_uses_new_session() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_script(vec![ScriptStep::message("first take")]);
        engine.push_script(vec![ScriptStep::message("second take")]);
        let (service, reports) = service(engine.clone(), Config::default());

        let mut req = request("idea");
        req.options.mode = AnalysisMode::Deep;
        let first = service.analyze(req).await.unwrap();
        let second = service.reanalyze(&first.report_id).await.unwrap();

        assert_ne!(first.report_id, second.report_id);
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(second.report, "second take");
        let stored = reports.get(&second.report_id).await.unwrap();
        assert_eq!(stored.options.mode, AnalysisMode::Deep);
        assert_eq!(reports.count().await, 2);

        assert!(matches!(
            service.reanalyze(&ReportId::new("missing")).await,
            Err(AnalysisError::ReportNotFound(_))
        ));
    }

    #[test]
    fn test_contract_violations_are_reported() {
        let response = AnalysisResponse {
            report_id: ReportId::new("r1"),
            session_id: SessionId::new("s1"),
            report: String::new(),
            interrupted: true,
            progress: 100,
            checkpoint_id: None,
            needs_approval: true,
            approval_id: None,
            tool_name: Some(String::new()),
            tool_args: None,
        };
        assert_eq!(
            validate_contract(&response),
            vec![
                "needsApproval without approvalId",
                "needsApproval without toolName",
                "interrupted result reports full progress",
            ]
        );
    }
}
