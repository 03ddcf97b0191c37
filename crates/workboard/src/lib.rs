//! # Work Board
//!
//! A rendezvous dispatcher that matches posted units of work, one-to-one, with
//! independent workers that advertise their own availability.
//!
//! ## Features
//!
//! - **Bounded backpressure**: posting suspends once `max_waiting_jobs` items are queued
//! - **Self-registering workers**: each worker offers a private inbox, runs what it receives, offers again
//! - **Exclusive hand-off**: every inbox is a single-use slot, so no two workers ever receive the same item
//! - **Clean shutdown**: boards and workers close independently without deadlocking each other
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  post_work   ┌─────────────────────────────────────────────┐
//! │  Producers   │ ───────────▶ │                    Board                    │
//! └──────────────┘              │  pending buffer (max_waiting_jobs)          │
//!                               │        │                                    │
//!                               │        ▼                                    │
//!                               │  dispatch loop ──spawn──▶ hand-off task     │
//!                               │                              │              │
//!                               │  offer buffer (worker_slots) ◀──┘ next offer │
//!                               └──────────────────────▲───────────┬──────────┘
//!                                          offer inbox │           │ deliver work
//!                               ┌──────────────────────┴───────────▼──────────┐
//!                               │   Worker (register → wait → run → repeat)   │
//!                               └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use workboard::prelude::*;
//!
//! let board = Board::with_capacity(10, 4)?;
//! let worker = Worker::new();
//! worker.work(&board)?;
//! board.start_dispatch()?;
//!
//! board.post_work(SimpleWork::new(|| println!("hello from a worker"))).await?;
//!
//! worker.stop();
//! worker.close().await;
//! board.close().await;
//! ```

pub mod board;
pub mod stats;
pub mod work;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::board::{Board, BoardConfig, BoardError, BoardStatus};
    pub use crate::stats::{BoardStatsSnapshot, WorkerStatsSnapshot};
    pub use crate::work::{SimpleWork, Work};
    pub use crate::worker::{Worker, WorkerError, WorkerState};
}

// Re-export key types at crate root
pub use board::{Board, BoardConfig, BoardError, BoardStatus};
pub use stats::{BoardStats, BoardStatsSnapshot, WorkerStats, WorkerStatsSnapshot};
pub use work::{SimpleWork, Work};
pub use worker::{Worker, WorkerError, WorkerState};
