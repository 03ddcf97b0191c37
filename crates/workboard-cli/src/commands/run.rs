// Run command: drive a board with simulated work

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::info;
use workboard::{
    Board, BoardConfig, BoardStatsSnapshot, SimpleWork, Worker, WorkerState, WorkerStatsSnapshot,
};

use crate::output::{print_field, print_row, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Units of work to post
    #[arg(long, env = "WORKBOARD_JOBS", default_value = "1000")]
    pub jobs: u64,

    /// Workers to register with the board
    #[arg(long, env = "WORKBOARD_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Pending-work capacity
    #[arg(long, env = "WORKBOARD_MAX_WAITING_JOBS", default_value = "64")]
    pub max_waiting_jobs: usize,

    /// Worker-offer capacity
    #[arg(long, env = "WORKBOARD_WORKER_SLOTS", default_value = "8")]
    pub worker_slots: usize,

    /// Simulated duration of each unit of work
    #[arg(long, env = "WORKBOARD_WORK_MILLIS", default_value = "0")]
    pub work_millis: u64,

    /// Make every Nth unit of work panic (0 disables)
    #[arg(long, env = "WORKBOARD_PANIC_EVERY", default_value = "0")]
    pub panic_every: u64,
}

#[derive(Debug, Serialize)]
struct RunReport {
    board_id: String,
    config: BoardConfig,
    jobs: u64,
    board: BoardStatsSnapshot,
    workers: Vec<WorkerReport>,
    elapsed_ms: u128,
    throughput_per_sec: f64,
}

#[derive(Debug, Serialize)]
struct WorkerReport {
    id: String,
    state: WorkerState,
    stats: WorkerStatsSnapshot,
}

/// Counts a unit of work as finished when dropped, including during a panic
struct Finished {
    remaining: Arc<AtomicU64>,
    all_done: Arc<Notify>,
}

impl Drop for Finished {
    fn drop(&mut self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_done.notify_one();
        }
    }
}

pub async fn run(args: RunArgs, output: OutputFormat) -> Result<()> {
    // Without workers a full pending buffer would suspend posting forever
    anyhow::ensure!(args.workers > 0, "--workers must be at least 1");

    let config = BoardConfig::new(args.max_waiting_jobs, args.worker_slots);
    let board = Board::new(config.clone()).context("Failed to create board")?;

    let workers: Vec<Worker> = (0..args.workers)
        .map(|i| Worker::with_id(format!("worker-{i}")))
        .collect();
    for worker in &workers {
        worker
            .work(&board)
            .with_context(|| format!("Failed to start {}", worker.id()))?;
    }
    board.start_dispatch().context("Failed to start dispatch")?;

    info!(
        board_id = %board.id(),
        jobs = args.jobs,
        workers = args.workers,
        "Posting work"
    );

    let remaining = Arc::new(AtomicU64::new(args.jobs));
    let all_done = Arc::new(Notify::new());
    let work_time = Duration::from_millis(args.work_millis);

    let start = Instant::now();
    for n in 1..=args.jobs {
        let finished = Finished {
            remaining: remaining.clone(),
            all_done: all_done.clone(),
        };
        let panics = args.panic_every > 0 && n % args.panic_every == 0;
        board
            .post_work(SimpleWork::new(move || {
                let _finished = finished;
                if !work_time.is_zero() {
                    std::thread::sleep(work_time);
                }
                if panics {
                    panic!("simulated failure in job {n}");
                }
            }))
            .await
            .with_context(|| format!("Failed to post job {n}"))?;
    }
    if args.jobs > 0 {
        all_done.notified().await;
    }
    let elapsed = start.elapsed();

    for worker in &workers {
        worker.stop();
    }
    board.close().await;
    for worker in &workers {
        worker.close().await;
    }

    let report = RunReport {
        board_id: board.id().to_string(),
        config,
        jobs: args.jobs,
        board: board.stats(),
        workers: workers
            .iter()
            .map(|w| WorkerReport {
                id: w.id().to_string(),
                state: w.state(),
                stats: w.stats(),
            })
            .collect(),
        elapsed_ms: elapsed.as_millis(),
        throughput_per_sec: throughput(args.jobs, elapsed),
    };

    if output.is_text() {
        print_report(&report);
    } else {
        output.print_value(&report)?;
    }

    Ok(())
}

fn throughput(jobs: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        jobs as f64 / secs
    } else {
        0.0
    }
}

fn print_report(report: &RunReport) {
    print_field("Board", &report.board_id);
    print_field("Waiting jobs", &report.config.max_waiting_jobs.to_string());
    print_field("Worker slots", &report.config.worker_slots.to_string());
    print_field("Posted", &report.board.posted.to_string());
    print_field("Dispatched", &report.board.dispatched.to_string());
    print_field("Abandoned", &report.board.abandoned.to_string());
    print_field("Elapsed", &format!("{}ms", report.elapsed_ms));
    print_field("Throughput", &format!("{:.1} jobs/s", report.throughput_per_sec));
    println!();

    print_row(&[("WORKER", 20), ("STATE", 12), ("COMPLETED", 10), ("PANICKED", 10)]);
    for worker in &report.workers {
        print_row(&[
            (&worker.id, 20),
            (&worker.state.to_string(), 12),
            (&worker.stats.completed.to_string(), 10),
            (&worker.stats.panicked.to_string(), 10),
        ]);
    }
}
