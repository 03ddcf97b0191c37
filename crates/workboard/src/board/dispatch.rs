//! Dispatch loop and per-item hand-off
//!
//! The loop only dequeues pending work. Waiting for a free worker happens in
//! a hand-off task per item, so one item stuck waiting never stops the loop
//! from draining the next. Concurrent hand-offs race for offers, which is why
//! matching order is not FIFO across items.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::{Offer, OfferQueue};
use crate::stats::BoardStats;
use crate::work::Job;

/// Run the dispatch loop until shutdown is signaled or every producer is gone
pub(super) async fn run(
    board_id: String,
    mut work_rx: mpsc::Receiver<Job>,
    offers: OfferQueue,
    mut shutdown_rx: watch::Receiver<bool>,
    hand_offs: TaskTracker,
    stats: Arc<BoardStats>,
) {
    let mut dequeued = 0u64;
    // `wait_for` below keeps `shutdown_rx` borrowed while an arm runs
    let hand_off_shutdown = shutdown_rx.clone();

    loop {
        tokio::select! {
            job = work_rx.recv() => {
                let Some(job) = job else {
                    debug!(board_id = %board_id, "All board handles dropped");
                    break;
                };
                dequeued += 1;
                hand_offs.spawn(hand_off(
                    job,
                    Arc::clone(&offers),
                    hand_off_shutdown.clone(),
                    Arc::clone(&stats),
                ));
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                debug!(board_id = %board_id, "Dispatch loop: shutdown requested");
                break;
            }
        }
    }

    let dropped = drain_pending(work_rx);
    stats.record_abandoned(dropped);

    info!(
        board_id = %board_id,
        dequeued,
        dropped,
        "Dispatch loop exited"
    );
}

/// Deliver one unit of work to the next live worker offer
///
/// Offers whose worker already stopped are skipped. On shutdown the work is
/// abandoned.
async fn hand_off(
    mut job: Job,
    offers: OfferQueue,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: Arc<BoardStats>,
) {
    loop {
        let offer = tokio::select! {
            offer = next_offer(&offers) => offer,
            _ = shutdown_rx.wait_for(|stop| *stop) => None,
        };

        let Some(Offer { worker_id, inbox }) = offer else {
            debug!("Hand-off abandoned: board shutting down");
            stats.record_abandoned(1);
            return;
        };

        match inbox.send(job) {
            Ok(()) => {
                debug!(worker_id = %worker_id, "Work handed to worker");
                stats.record_dispatched();
                return;
            }
            Err(returned) => {
                debug!(worker_id = %worker_id, "Skipping stale offer");
                job = returned;
            }
        }
    }
}

async fn next_offer(offers: &OfferQueue) -> Option<Offer> {
    offers.lock().await.recv().await
}

/// Close the pending buffer and drop whatever it still holds
pub(super) fn drain_pending(mut work_rx: mpsc::Receiver<Job>) -> u64 {
    work_rx.close();
    let mut dropped = 0;
    while work_rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
