//! Collaborator traits the run controller drives.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use ideascope_core::{Checkpoint, CheckpointId, RunId, SessionId};

use crate::error::EngineError;
use crate::event::AgentEvent;

/// Lazily produced progress events of one execution, in emission order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, EngineError>> + Send>>;

/// Everything an engine needs to start an execution.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub session_id: SessionId,
    pub prompt: String,
    pub model: Option<String>,
    pub max_iterations: u32,
}

/// The task-execution engine.
#[async_trait]
pub trait TaskEngine: Send + Sync {
    /// Start an execution.
    ///
    /// Returns [`EngineError::ConcurrencyConflict`] before producing any event
    /// if another execution already occupies the engine.
    async fn start_run(&self, request: RunRequest) -> Result<EventStream, EngineError>;

    /// Names of the tools the engine can call. Best-effort.
    async fn list_tools(&self) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }
}

/// Snapshot storage for execution state.
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    /// Snapshot the current execution state under a name.
    async fn create(&self, name: &str) -> Result<Checkpoint, EngineError>;

    async fn list(&self) -> Result<Vec<Checkpoint>, EngineError>;

    /// Rehydrate the execution context so the next run resumes from `id`.
    async fn restore(&self, id: &CheckpointId) -> Result<(), EngineError>;

    /// Returns false if no such checkpoint existed.
    async fn delete(&self, id: &CheckpointId) -> Result<bool, EngineError>;
}

/// The engine's single execution slot.
#[derive(Debug, Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or fail with a concurrency conflict.
    pub fn try_acquire(&self) -> Result<SlotGuard, EngineError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(EngineError::ConcurrencyConflict);
        }
        Ok(SlotGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Releases the slot on drop.
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Channel-backed event stream that holds the execution slot until the
/// consumer drops it.
struct GuardedStream {
    inner: ReceiverStream<Result<AgentEvent, EngineError>>,
    _guard: SlotGuard,
}

impl Stream for GuardedStream {
    type Item = Result<AgentEvent, EngineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Create the producer side and the stream for one execution.
///
/// Capacity is one: the producer never runs more than one event ahead.
pub fn event_channel(
    guard: SlotGuard,
) -> (mpsc::Sender<Result<AgentEvent, EngineError>>, EventStream) {
    let (tx, rx) = mpsc::channel(1);
    let stream = GuardedStream {
        inner: ReceiverStream::new(rx),
        _guard: guard,
    };
    (tx, Box::pin(stream))
}
