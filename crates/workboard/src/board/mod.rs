//! The work board: pending work on one side, available workers on the other
//!
//! This module provides:
//! - [`Board`] - Rendezvous point with a single dispatch loop
//! - [`BoardConfig`] - Capacities of the pending-work and worker-offer buffers
//! - [`BoardStatus`] - Lifecycle of a board
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ──start_dispatch──▶ Dispatching ──close──▶ Closing ──▶ Closed
//!   │                                                 ▲
//!   └──────────────────────────close──────────────────┘
//! ```

mod config;
mod dispatch;

pub use config::BoardConfig;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::stats::{BoardStats, BoardStatsSnapshot};
use crate::work::{Job, Work};

/// Board errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Invalid configuration
    #[error("invalid board configuration: {0}")]
    InvalidConfig(String),

    /// Dispatch loop already started
    #[error("board is already dispatching")]
    AlreadyDispatching,

    /// Board closed
    #[error("board is closed")]
    Closed,
}

/// Board status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    /// Accepting work, not dispatching yet
    Idle,
    /// Dispatch loop running
    Dispatching,
    /// Shutdown requested, waiting for the dispatch loop
    Closing,
    /// Buffers released
    Closed,
}

impl std::fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// A worker's announcement that it can take exactly one unit of work
pub(crate) struct Offer {
    pub(crate) worker_id: Arc<str>,
    pub(crate) inbox: oneshot::Sender<Job>,
}

/// Receiving side of the offer buffer, shared by hand-off tasks
pub(crate) type OfferQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<Offer>>>;

/// Rendezvous point matching posted work with available workers
///
/// Cloning a `Board` yields another handle to the same board.
///
/// # Example
///
/// ```ignore
/// use workboard::{Board, SimpleWork, Worker};
///
/// let board = Board::with_capacity(10, 4)?;
/// board.start_dispatch()?;
///
/// let worker = Worker::new();
/// worker.work(&board)?;
///
/// board.post_work(SimpleWork::new(|| println!("done"))).await?;
/// ```
#[derive(Clone)]
pub struct Board {
    inner: Arc<BoardInner>,
}

struct BoardInner {
    id: String,
    config: BoardConfig,
    work_tx: mpsc::Sender<Job>,
    work_rx: Mutex<Option<mpsc::Receiver<Job>>>,
    offer_tx: mpsc::Sender<Offer>,
    offers: OfferQueue,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<BoardStatus>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    hand_offs: TaskTracker,
    stats: Arc<BoardStats>,
}

impl Board {
    /// Create a new board
    pub fn new(config: BoardConfig) -> Result<Self, BoardError> {
        config.validate()?;

        let (work_tx, work_rx) = mpsc::channel(config.max_waiting_jobs);
        let (offer_tx, offer_rx) = mpsc::channel(config.worker_slots);
        let (shutdown_tx, _) = watch::channel(false);
        let id = format!("board-{}", Uuid::now_v7());

        debug!(
            board_id = %id,
            max_waiting_jobs = config.max_waiting_jobs,
            worker_slots = config.worker_slots,
            "Created board"
        );

        Ok(Self {
            inner: Arc::new(BoardInner {
                id,
                config,
                work_tx,
                work_rx: Mutex::new(Some(work_rx)),
                offer_tx,
                offers: Arc::new(tokio::sync::Mutex::new(offer_rx)),
                shutdown_tx,
                status: RwLock::new(BoardStatus::Idle),
                dispatch_handle: Mutex::new(None),
                hand_offs: TaskTracker::new(),
                stats: Arc::new(BoardStats::new()),
            }),
        })
    }

    /// Create a board from raw capacities
    pub fn with_capacity(max_waiting_jobs: usize, worker_slots: usize) -> Result<Self, BoardError> {
        Self::new(BoardConfig::new(max_waiting_jobs, worker_slots))
    }

    /// Pin a unit of work on the board
    ///
    /// Suspends while the pending buffer is full. Fails with
    /// [`BoardError::Closed`] once the board is closed, including when it
    /// closes while this call is suspended.
    pub async fn post_work<W: Work>(&self, work: W) -> Result<(), BoardError> {
        self.post_job(Box::new(work)).await
    }

    /// Pin an already boxed unit of work on the board
    pub async fn post_job(&self, job: Box<dyn Work>) -> Result<(), BoardError> {
        if self.status() == BoardStatus::Closed {
            return Err(BoardError::Closed);
        }

        self.inner
            .work_tx
            .send(job)
            .await
            .map_err(|_| BoardError::Closed)?;
        self.inner.stats.record_posted();
        Ok(())
    }

    /// Start the dispatch loop on the current tokio runtime
    ///
    /// Exactly one loop runs per board; a second call fails with
    /// [`BoardError::AlreadyDispatching`].
    pub fn start_dispatch(&self) -> Result<(), BoardError> {
        // Held until the handle is stored so `close` always finds the loop
        let mut status = self.inner.status.write();
        match *status {
            BoardStatus::Idle => {}
            BoardStatus::Dispatching => return Err(BoardError::AlreadyDispatching),
            BoardStatus::Closing | BoardStatus::Closed => return Err(BoardError::Closed),
        }
        let work_rx = self
            .inner
            .work_rx
            .lock()
            .take()
            .ok_or(BoardError::AlreadyDispatching)?;

        info!(
            board_id = %self.inner.id,
            max_waiting_jobs = self.inner.config.max_waiting_jobs,
            worker_slots = self.inner.config.worker_slots,
            "Starting dispatch"
        );

        let handle = tokio::spawn(dispatch::run(
            self.inner.id.clone(),
            work_rx,
            Arc::clone(&self.inner.offers),
            self.inner.shutdown_tx.subscribe(),
            self.inner.hand_offs.clone(),
            Arc::clone(&self.inner.stats),
        ));

        *self.inner.dispatch_handle.lock() = Some(handle);
        *status = BoardStatus::Dispatching;
        Ok(())
    }

    /// Shut the board down
    ///
    /// Signals the dispatch loop, waits for it to exit, waits for in-flight
    /// hand-offs to give up, then releases both buffers. Work that was not yet
    /// matched with a worker is dropped and counted as abandoned. Workers
    /// still offered to this board stop on their own once their offer is
    /// dropped. Calling `close` again is a no-op.
    pub async fn close(&self) {
        {
            let mut status = self.inner.status.write();
            match *status {
                BoardStatus::Closing | BoardStatus::Closed => return,
                BoardStatus::Idle | BoardStatus::Dispatching => *status = BoardStatus::Closing,
            }
        }

        info!(board_id = %self.inner.id, "Closing board");
        self.inner.shutdown_tx.send_replace(true);

        let handle = self.inner.dispatch_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(board_id = %self.inner.id, "Dispatch loop failed: {}", e);
            }
        }

        self.inner.hand_offs.close();
        self.inner.hand_offs.wait().await;

        // Never dispatched: the pending buffer is still parked here
        let work_rx = self.inner.work_rx.lock().take();
        if let Some(work_rx) = work_rx {
            let dropped = dispatch::drain_pending(work_rx);
            self.inner.stats.record_abandoned(dropped);
        }

        let stale_offers = {
            let mut offers = self.inner.offers.lock().await;
            offers.close();
            let mut stale = 0usize;
            while offers.try_recv().is_ok() {
                stale += 1;
            }
            stale
        };

        *self.inner.status.write() = BoardStatus::Closed;

        let stats = self.inner.stats.snapshot();
        info!(
            board_id = %self.inner.id,
            posted = stats.posted,
            dispatched = stats.dispatched,
            abandoned = stats.abandoned,
            stale_offers,
            "Board closed"
        );
    }

    /// Register a worker's inbox as available
    ///
    /// Suspends while the offer buffer is full.
    pub(crate) async fn offer(&self, offer: Offer) -> Result<(), BoardError> {
        self.inner
            .offer_tx
            .send(offer)
            .await
            .map_err(|_| BoardError::Closed)
    }

    /// Take the next buffered offer as a hand-off would
    #[cfg(test)]
    pub(crate) async fn take_offer(&self) -> Option<Offer> {
        self.inner.offers.lock().await.recv().await
    }

    /// Unique board ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Board configuration
    pub fn config(&self) -> &BoardConfig {
        &self.inner.config
    }

    /// Current status
    pub fn status(&self) -> BoardStatus {
        *self.inner.status.read()
    }

    /// Snapshot of dispatch counters
    pub fn stats(&self) -> BoardStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Units of work waiting in the pending buffer
    pub fn pending_work(&self) -> usize {
        self.inner.config.max_waiting_jobs - self.inner.work_tx.capacity()
    }

    /// Worker offers waiting in the offer buffer, including stale ones
    pub fn offered_workers(&self) -> usize {
        self.inner.config.worker_slots - self.inner.offer_tx.capacity()
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
