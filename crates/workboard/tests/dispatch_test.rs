//! Integration tests for board dispatch and worker lifecycle
//!
//! Run with: cargo test -p workboard --test dispatch_test
//!
//! Set RUST_LOG=workboard=debug to see hand-off traces.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::timeout;

use workboard::{Board, BoardError, BoardStatus, SimpleWork, Worker, WorkerState};

/// Grace period used to assert that something is still blocked
const GRACE: Duration = Duration::from_millis(150);

/// Upper bound for things that must happen
const DEADLINE: Duration = Duration::from_secs(10);

/// Work that reports its index once it has run
fn reporting_work(
    index: usize,
    done_tx: mpsc::UnboundedSender<usize>,
) -> SimpleWork<impl FnOnce() + Send + 'static> {
    SimpleWork::new(move || {
        let _ = done_tx.send(index);
    })
}

/// Wait until `n` completions have been reported
async fn collect(done_rx: &mut mpsc::UnboundedReceiver<usize>, n: usize) -> Vec<usize> {
    timeout(DEADLINE, async {
        let mut seen = Vec::with_capacity(n);
        while seen.len() < n {
            match done_rx.recv().await {
                Some(index) => seen.push(index),
                None => break,
            }
        }
        seen
    })
    .await
    .expect("work did not complete in time")
}

async fn shutdown(board: &Board, workers: &[Worker]) {
    for worker in workers {
        worker.stop();
    }
    board.close().await;
    let closed = join_all(workers.iter().map(|worker| timeout(DEADLINE, worker.close()))).await;
    assert!(closed.iter().all(Result::is_ok), "worker did not close");
}

// ============================================
// Posting and Backpressure
// ============================================

#[test_log::test(tokio::test)]
async fn test_post_up_to_capacity_never_blocks() {
    let board = Board::with_capacity(5, 1).unwrap();

    for _ in 0..5 {
        timeout(GRACE, board.post_work(SimpleWork::new(|| {})))
            .await
            .expect("post_work blocked below capacity")
            .unwrap();
    }

    assert_eq!(board.pending_work(), 5);
    assert_eq!(board.stats().posted, 5);
    board.close().await;
}

#[test_log::test(tokio::test)]
async fn test_post_blocks_when_pending_buffer_full() {
    let board = Board::with_capacity(1, 1).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let r = ran.clone();
    timeout(
        GRACE,
        board.post_work(SimpleWork::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })),
    )
    .await
    .expect("first post should not block")
    .unwrap();

    let blocked = tokio::spawn({
        let board = board.clone();
        async move { board.post_work(SimpleWork::new(|| {})).await }
    });

    tokio::time::sleep(GRACE).await;
    assert!(!blocked.is_finished(), "second post should still be blocked");

    // Closing releases the suspended producer
    board.close().await;
    let result = timeout(DEADLINE, blocked).await.unwrap().unwrap();
    assert_eq!(result, Err(BoardError::Closed));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_worker_drains_blocked_producer() {
    let board = Board::with_capacity(1, 1).unwrap();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    board.post_work(reporting_work(0, done_tx.clone())).await.unwrap();
    let producer = tokio::spawn({
        let board = board.clone();
        let done_tx = done_tx.clone();
        async move { board.post_work(reporting_work(1, done_tx)).await }
    });

    tokio::time::sleep(GRACE).await;
    assert!(!producer.is_finished());

    let worker = Worker::new();
    worker.work(&board).unwrap();
    board.start_dispatch().unwrap();

    timeout(DEADLINE, producer).await.unwrap().unwrap().unwrap();
    let mut seen = collect(&mut done_rx, 2).await;
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1]);

    shutdown(&board, &[worker]).await;
}

// ============================================
// Dispatch
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_stress_each_item_runs_exactly_once() {
    const ITEMS: usize = 100;

    let board = Board::with_capacity(10, 4).unwrap();
    let workers: Vec<Worker> = (0..4).map(|i| Worker::with_id(format!("worker-{i}"))).collect();
    for worker in &workers {
        worker.work(&board).unwrap();
    }

    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..ITEMS).map(|_| AtomicUsize::new(0)).collect());
    let counter = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    // More items than the pending buffer holds, so post from a producer task
    let producer = tokio::spawn({
        let board = board.clone();
        let runs = runs.clone();
        let counter = counter.clone();
        async move {
            for i in 0..ITEMS {
                let runs = runs.clone();
                let counter = counter.clone();
                let done_tx = done_tx.clone();
                board
                    .post_work(SimpleWork::new(move || {
                        runs[i].fetch_add(1, Ordering::SeqCst);
                        counter.fetch_add(1, Ordering::SeqCst);
                        let _ = done_tx.send(i);
                    }))
                    .await
                    .unwrap();
            }
        }
    });

    board.start_dispatch().unwrap();
    timeout(DEADLINE, producer).await.unwrap().unwrap();

    let seen = collect(&mut done_rx, ITEMS).await;
    assert_eq!(seen.len(), ITEMS);
    assert_eq!(counter.load(Ordering::SeqCst), ITEMS);
    for (i, run) in runs.iter().enumerate() {
        assert_eq!(run.load(Ordering::SeqCst), 1, "item {i} ran more or less than once");
    }

    shutdown(&board, &workers).await;

    // Each item reached exactly one worker
    let received: u64 = workers.iter().map(|w| w.stats().received()).sum();
    assert_eq!(received, ITEMS as u64);

    let stats = board.stats();
    assert_eq!(stats.posted, ITEMS as u64);
    assert_eq!(stats.dispatched, ITEMS as u64);
    assert_eq!(stats.abandoned, 0);
    for worker in &workers {
        assert_eq!(worker.state(), WorkerState::Closed);
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_stale_offer_does_not_lose_work() {
    let board = Board::with_capacity(4, 4).unwrap();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    // Offers itself, then stops: its offer stays in the buffer
    let quitter = Worker::with_id("quitter");
    quitter.work(&board).unwrap();
    timeout(DEADLINE, async {
        while board.offered_workers() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    quitter.stop();
    assert_eq!(quitter.wait_stopped().await, WorkerState::Stopped);

    let worker = Worker::with_id("stayer");
    worker.work(&board).unwrap();
    board.start_dispatch().unwrap();
    board.post_work(reporting_work(7, done_tx)).await.unwrap();

    assert_eq!(collect(&mut done_rx, 1).await, vec![7]);
    assert_eq!(board.stats().dispatched, 1);

    shutdown(&board, &[quitter.clone(), worker.clone()]).await;
    assert_eq!(quitter.stats().received(), 0);
    assert_eq!(worker.stats().completed, 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_worker_slots_throttle_registration() {
    let board = Board::with_capacity(4, 1).unwrap();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let first = Worker::with_id("first");
    let second = Worker::with_id("second");
    first.work(&board).unwrap();
    second.work(&board).unwrap();

    tokio::time::sleep(GRACE).await;
    // Only one offer fits; the other worker is suspended registering
    assert_eq!(board.offered_workers(), 1);
    assert_eq!(first.state(), WorkerState::Running);
    assert_eq!(second.state(), WorkerState::Running);

    board.start_dispatch().unwrap();
    for i in 0..2 {
        board.post_work(reporting_work(i, done_tx.clone())).await.unwrap();
    }

    let mut seen = collect(&mut done_rx, 2).await;
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1]);

    // A worker suspended on registration only stops once the board closes
    shutdown(&board, &[first, second]).await;
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_boards_do_not_share_workers() {
    let left = Board::with_capacity(4, 2).unwrap();
    let right = Board::with_capacity(4, 2).unwrap();
    let left_worker = Worker::with_id("left");
    let right_worker = Worker::with_id("right");
    left_worker.work(&left).unwrap();
    right_worker.work(&right).unwrap();
    left.start_dispatch().unwrap();
    right.start_dispatch().unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    for i in 0..3 {
        left.post_work(reporting_work(i, done_tx.clone())).await.unwrap();
    }
    right.post_work(reporting_work(10, done_tx)).await.unwrap();

    collect(&mut done_rx, 4).await;

    shutdown(&left, &[left_worker.clone()]).await;
    shutdown(&right, &[right_worker.clone()]).await;
    assert_eq!(left_worker.stats().completed, 3);
    assert_eq!(right_worker.stats().completed, 1);
}

// ============================================
// Board Shutdown
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_close_without_workers_drops_pending_work() {
    const ITEMS: usize = 5;

    let board = Board::with_capacity(ITEMS, 2).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    board.start_dispatch().unwrap();

    for _ in 0..ITEMS {
        let ran = ran.clone();
        board
            .post_work(SimpleWork::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
    }

    timeout(DEADLINE, board.close()).await.unwrap();
    assert_eq!(board.status(), BoardStatus::Closed);

    // A worker arriving late finds the board closed and stops by itself
    let late = Worker::new();
    late.work(&board).unwrap();
    assert_eq!(
        timeout(DEADLINE, late.wait_stopped()).await.unwrap(),
        WorkerState::Stopped
    );

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    let stats = board.stats();
    assert_eq!(stats.posted, ITEMS as u64);
    assert_eq!(stats.dispatched, 0);
    assert_eq!(stats.abandoned, ITEMS as u64);
    assert_eq!(stats.in_flight(), 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_board_close_stops_registered_workers() {
    let board = Board::with_capacity(2, 2).unwrap();
    let workers = vec![Worker::new(), Worker::new()];
    for worker in &workers {
        worker.work(&board).unwrap();
    }
    board.start_dispatch().unwrap();

    timeout(DEADLINE, board.close()).await.unwrap();

    for worker in &workers {
        assert_eq!(
            timeout(DEADLINE, worker.wait_stopped()).await.unwrap(),
            WorkerState::Stopped
        );
        worker.close().await;
    }
}

// ============================================
// Worker Lifecycle
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_worker_close_blocks_while_running() {
    let board = Board::with_capacity(1, 1).unwrap();
    let worker = Worker::new();
    worker.work(&board).unwrap();

    let closing = tokio::spawn({
        let worker = worker.clone();
        async move { worker.close().await }
    });

    tokio::time::sleep(GRACE).await;
    assert!(!closing.is_finished(), "close returned while worker was running");
    assert_eq!(worker.state(), WorkerState::Running);

    worker.stop();
    timeout(DEADLINE, closing).await.unwrap().unwrap();
    assert_eq!(worker.state(), WorkerState::Closed);

    board.close().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_stop_lets_running_work_finish() {
    let board = Board::with_capacity(1, 1).unwrap();
    let worker = Worker::new();
    worker.work(&board).unwrap();
    board.start_dispatch().unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    board
        .post_work(SimpleWork::new({
            let started = started.clone();
            let finished = finished.clone();
            move || {
                started.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            }
        }))
        .await
        .unwrap();

    timeout(DEADLINE, async {
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    worker.stop();
    timeout(DEADLINE, worker.close()).await.unwrap();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(worker.stats().completed, 1);
    board.close().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_panicking_work_does_not_kill_worker() {
    let board = Board::with_capacity(4, 1).unwrap();
    let worker = Worker::new();
    worker.work(&board).unwrap();
    board.start_dispatch().unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    board
        .post_work(SimpleWork::new(|| panic!("boom")))
        .await
        .unwrap();
    board.post_work(reporting_work(1, done_tx)).await.unwrap();

    assert_eq!(collect(&mut done_rx, 1).await, vec![1]);
    assert_eq!(worker.state(), WorkerState::Running);

    shutdown(&board, &[worker.clone()]).await;
    let stats = worker.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 1);
}
