//! Workers that offer themselves to a board and run what they receive
//!
//! A worker loops through three steps: offer a fresh single-use inbox to the
//! board, wait for either work or a stop request, run the work to completion.
//! Work runs on tokio's blocking pool and is awaited, so a worker executes at
//! most one unit at a time and a panicking unit does not take the worker down.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::board::{Board, Offer};
use crate::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::work::Job;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Never started
    NotStarted,
    /// Offering itself to a board and running work
    Running,
    /// Loop exited, may be started again
    Stopped,
    /// Resources released, cannot be started again
    Closed,
}

impl WorkerState {
    /// Check if the worker loop is not running
    pub fn is_idle(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Worker errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// Worker loop already running
    #[error("worker {0} is already running")]
    AlreadyRunning(String),

    /// Worker closed
    #[error("worker {0} is closed")]
    Closed(String),
}

/// Why a worker loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    StopRequested,
    BoardClosed,
}

/// An independent execution agent
///
/// Cloning a `Worker` yields another handle to the same worker.
///
/// # Example
///
/// ```ignore
/// use workboard::{Board, Worker};
///
/// let board = Board::with_capacity(10, 4)?;
/// let worker = Worker::new();
/// worker.work(&board)?;
///
/// // ... later
/// worker.stop();
/// worker.close().await;
/// ```
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    id: Arc<str>,
    stop_tx: mpsc::Sender<()>,
    /// Parked here while idle, owned by the loop while running
    stop_rx: Mutex<Option<mpsc::Receiver<()>>>,
    state: watch::Sender<WorkerState>,
    stats: WorkerStats,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker {
    /// Create a new worker with a generated ID
    pub fn new() -> Self {
        Self::with_id(format!("worker-{}", Uuid::now_v7()))
    }

    /// Create a new worker with the given ID
    pub fn with_id(id: impl Into<String>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(WorkerState::NotStarted);

        Self {
            inner: Arc::new(WorkerInner {
                id: Arc::from(id.into()),
                stop_tx,
                stop_rx: Mutex::new(Some(stop_rx)),
                state,
                stats: WorkerStats::new(),
            }),
        }
    }

    /// Start offering this worker to `board`
    ///
    /// Returns immediately; the registration loop runs on the current tokio
    /// runtime until [`stop`](Self::stop) is observed or the board closes.
    pub fn work(&self, board: &Board) -> Result<(), WorkerError> {
        let mut outcome = Ok(());
        self.inner.state.send_if_modified(|state| match *state {
            WorkerState::Running => {
                outcome = Err(WorkerError::AlreadyRunning(self.inner.id.to_string()));
                false
            }
            WorkerState::Closed => {
                outcome = Err(WorkerError::Closed(self.inner.id.to_string()));
                false
            }
            WorkerState::NotStarted | WorkerState::Stopped => {
                *state = WorkerState::Running;
                true
            }
        });
        outcome?;

        let Some(mut stop_rx) = self.inner.stop_rx.lock().take() else {
            self.inner.state.send_replace(WorkerState::Closed);
            return Err(WorkerError::Closed(self.inner.id.to_string()));
        };
        // A stop requested before this run belongs to a previous one
        while stop_rx.try_recv().is_ok() {}

        info!(worker_id = %self.inner.id, board_id = %board.id(), "Worker started");

        let worker = Arc::clone(&self.inner);
        let board = board.clone();
        let span = tracing::info_span!("worker", worker_id = %self.inner.id);

        tokio::spawn(
            async move {
                let exit = worker.run(&board, &mut stop_rx).await;

                // Hand the stop signal back before announcing the new state
                *worker.stop_rx.lock() = Some(stop_rx);
                worker.state.send_replace(WorkerState::Stopped);

                let stats = worker.stats.snapshot();
                info!(
                    exit = ?exit,
                    completed = stats.completed,
                    panicked = stats.panicked,
                    "Worker stopped"
                );
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Ask the worker to stop offering itself
    ///
    /// Non-blocking. Work already running is never interrupted; the stop is
    /// observed once the worker is registered and waiting. No-op unless the
    /// worker is running.
    pub fn stop(&self) {
        if *self.inner.state.borrow() != WorkerState::Running {
            return;
        }
        // A full channel means a stop is already pending
        let _ = self.inner.stop_tx.try_send(());
        debug!(worker_id = %self.inner.id, "Stop requested");
    }

    /// Wait until the worker loop is not running
    pub async fn wait_stopped(&self) -> WorkerState {
        let mut state_rx = self.inner.state.subscribe();
        let idle = state_rx
            .wait_for(WorkerState::is_idle)
            .await
            .map(|state| *state);
        idle.unwrap_or_else(|_| self.state())
    }

    /// Release the worker's resources
    ///
    /// Waits for as long as the worker is running, so call
    /// [`stop`](Self::stop) first. Afterwards the worker cannot be started
    /// again. Calling `close` again is a no-op.
    pub async fn close(&self) {
        loop {
            self.wait_stopped().await;

            let released = self.inner.state.send_if_modified(|state| match *state {
                WorkerState::Running => false,
                WorkerState::Closed => false,
                WorkerState::NotStarted | WorkerState::Stopped => {
                    *state = WorkerState::Closed;
                    true
                }
            });

            if released {
                self.inner.stop_rx.lock().take();
                debug!(worker_id = %self.inner.id, "Worker closed");
                return;
            }
            if self.state() == WorkerState::Closed {
                return;
            }
        }
    }

    /// Unique worker ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.inner.state.borrow()
    }

    /// Snapshot of execution counters
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl WorkerInner {
    async fn run(&self, board: &Board, stop_rx: &mut mpsc::Receiver<()>) -> Exit {
        loop {
            let (inbox, mut inbox_rx) = oneshot::channel();
            let offer = Offer {
                worker_id: Arc::clone(&self.id),
                inbox,
            };
            if board.offer(offer).await.is_err() {
                debug!("Board closed while offering");
                return Exit::BoardClosed;
            }

            tokio::select! {
                job = &mut inbox_rx => match job {
                    Ok(job) => self.execute(job).await,
                    Err(_) => {
                        debug!("Board dropped offer");
                        return Exit::BoardClosed;
                    }
                },
                _ = stop_rx.recv() => {
                    // Closing first makes any later hand-off see a stale offer
                    inbox_rx.close();
                    if let Ok(job) = inbox_rx.try_recv() {
                        debug!("Running work delivered before stop");
                        self.execute(job).await;
                    }
                    return Exit::StopRequested;
                }
            }
        }
    }

    async fn execute(&self, job: Job) {
        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(()) => self.stats.record_completed(),
            Err(e) if e.is_panic() => {
                self.stats.record_panicked();
                error!("Work panicked: {}", e);
            }
            Err(e) => {
                error!("Work did not complete: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
