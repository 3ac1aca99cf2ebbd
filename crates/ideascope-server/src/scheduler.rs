//! Single-flight run scheduler.
//!
//! Submissions go into a FIFO consumed by one worker task, so at most one run
//! executes at a time and runs start in arrival order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ideascope_core::RunOutcome;

use crate::controller::{RunController, RunSpec};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Run scheduler is not running")]
    Closed,

    #[error("Run was dropped before it finished")]
    Dropped,
}

struct Job {
    spec: RunSpec,
    reply: oneshot::Sender<RunOutcome>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct Stats {
    active: AtomicBool,
    outcomes: Mutex<BTreeMap<&'static str, u64>>,
}

impl Stats {
    fn record(&self, outcome: &RunOutcome) {
        let mut outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *outcomes.entry(outcome.label()).or_default() += 1;
    }
}

/// Handle to the run queue. Cheap to clone.
#[derive(Clone)]
pub struct RunScheduler {
    tx: mpsc::Sender<Job>,
    stats: Arc<Stats>,
}

impl RunScheduler {
    /// Start the worker loop on the current runtime.
    pub fn spawn(controller: Arc<RunController>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let stats = Arc::new(Stats::default());
        let worker_stats = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                worker_stats.active.store(true, Ordering::SeqCst);
                debug!(
                    session_id = %job.spec.session_id,
                    waited_ms = job.enqueued_at.elapsed().as_millis() as u64,
                    "Dequeued run"
                );

                let outcome = controller.execute(job.spec).await;

                worker_stats.active.store(false, Ordering::SeqCst);
                worker_stats.record(&outcome);
                if job.reply.send(outcome).is_err() {
                    warn!("Submitter went away before the run finished");
                }
            }
            info!("Run scheduler stopped");
        });

        Self { tx, stats }
    }

    /// Queue a run and wait for its outcome.
    pub async fn submit(&self, spec: RunSpec) -> Result<RunOutcome, SchedulerError> {
        let (reply, outcome) = oneshot::channel();
        let job = Job {
            spec,
            reply,
            enqueued_at: Instant::now(),
        };
        self.tx
            .send(job)
            .await
            .map_err(|_| SchedulerError::Closed)?;
        outcome.await.map_err(|_| SchedulerError::Dropped)
    }

    /// Runs waiting for the slot. Read from the channel, so submitters that
    /// give up while blocked on a full queue are never counted.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_busy(&self) -> bool {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Finished runs by outcome label.
    pub fn outcome_counts(&self) -> Vec<(&'static str, u64)> {
        self.stats
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(label, count)| (*label, *count))
            .collect()
    }
}
