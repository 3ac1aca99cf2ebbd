//! Shared application state.

use std::sync::Arc;

use ideascope_agent::{CheckpointBackend, TaskEngine};
use ideascope_core::{Clock, SystemClock};

use crate::approval::ApprovalStore;
use crate::checkpoint::CheckpointCoordinator;
use crate::config::Config;
use crate::controller::RunController;
use crate::gate::ApprovalGate;
use crate::reports::ReportStore;
use crate::scheduler::RunScheduler;
use crate::service::AnalysisService;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// The execution engine, for tool listing.
    pub engine: Arc<dyn TaskEngine>,

    pub approvals: Arc<ApprovalStore>,

    pub checkpoints: CheckpointCoordinator,

    pub reports: Arc<ReportStore>,

    pub scheduler: RunScheduler,

    pub analysis: AnalysisService,
}

impl AppState {
    /// Wire the components around an engine and start the run scheduler.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<E>(config: Config, engine: Arc<E>) -> Arc<Self>
    where
        E: TaskEngine + CheckpointBackend + 'static,
    {
        Self::with_clock(config, engine, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`] with an explicit clock for approval retention.
    pub fn with_clock<E>(config: Config, engine: Arc<E>, clock: Arc<dyn Clock>) -> Arc<Self>
    where
        E: TaskEngine + CheckpointBackend + 'static,
    {
        let tasks: Arc<dyn TaskEngine> = engine.clone();
        let checkpoints = CheckpointCoordinator::new(engine);
        let approvals = Arc::new(ApprovalStore::with_clock(config.approval_retention, clock));
        let gate = ApprovalGate::new(Arc::clone(&approvals), checkpoints.clone());
        let controller = RunController::new(
            Arc::clone(&tasks),
            checkpoints.clone(),
            gate,
            config.call_counting,
        );
        let scheduler = RunScheduler::spawn(Arc::new(controller), config.queue_capacity);
        let reports = Arc::new(ReportStore::new());
        let analysis = AnalysisService::new(scheduler.clone(), Arc::clone(&reports), &config);

        Arc::new(Self {
            config,
            engine: tasks,
            approvals,
            checkpoints,
            reports,
            scheduler,
            analysis,
        })
    }
}
