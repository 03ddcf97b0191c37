//! Minimal board with a handful of workers
//!
//! Run with: RUST_LOG=workboard=debug cargo run -p workboard --example simple_board

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workboard::prelude::*;

const JOBS: usize = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "workboard=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let board = Board::new(BoardConfig::default().with_max_waiting_jobs(10).with_worker_slots(4))?;
    let workers: Vec<Worker> = (0..4).map(|i| Worker::with_id(format!("worker-{i}"))).collect();
    for worker in &workers {
        worker.work(&board)?;
    }
    board.start_dispatch()?;

    let done = Arc::new(AtomicUsize::new(0));
    let all_done = Arc::new(Notify::new());
    for i in 0..JOBS {
        let done = done.clone();
        let all_done = all_done.clone();
        board
            .post_work(SimpleWork::new(move || {
                std::thread::sleep(Duration::from_millis(10));
                println!("job {i} done on {:?}", std::thread::current().id());
                if done.fetch_add(1, Ordering::SeqCst) + 1 == JOBS {
                    all_done.notify_one();
                }
            }))
            .await?;
    }
    all_done.notified().await;

    for worker in &workers {
        worker.stop();
    }
    board.close().await;
    for worker in &workers {
        worker.close().await;
        println!("{}: {:?}", worker.id(), worker.stats());
    }
    println!("board: {:?}", board.stats());

    Ok(())
}
