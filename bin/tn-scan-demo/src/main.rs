//! Demo driver for `tn-task-engine` and `tn-scanner`.
//!
//! Spins up a thread pool, runs a handful of representative priority/sleepy tasks across it, then
//! drives the scan state machine against an in-memory mock chain (optionally applying a reorg
//! partway through) and reports the final consumer state.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Parser;
use tn_config::{ScanMachineConfig, ThreadPoolConfig};
use tn_scanner::{try_advance_state_machine, ScanMachineMetadata};
use tn_task_engine::{SimpleTask, TaskResult, ThreadPool, WakeTime};
use tn_test_utils::{MockConsumer, MockLedger};
use tn_types::BlockId;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tn-scan-demo", about = "Demo driver for the task engine and scan state machine")]
struct Args {
    /// Number of blocks in the initial mock chain.
    #[arg(long, default_value_t = 20)]
    blocks: u8,

    /// Block index at which to simulate a reorg after the first full scan. `0` disables it.
    #[arg(long, default_value_t = 0)]
    reorg_at: u8,

    /// Number of worker threads in the demo thread pool.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Maximum blocks requested per scan chunk.
    #[arg(long, default_value_t = 8)]
    max_chunk_size: u64,
}

fn block(n: u8) -> BlockId {
    let mut bytes = [0u8; 32];
    bytes[0] = n;
    BlockId::new(bytes)
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    run_task_engine_demo(args.workers);
    run_scan_demo(args.blocks, args.reorg_at, args.max_chunk_size)?;

    Ok(())
}

/// Exercises the thread pool: a burst of priority-ordered tasks plus a few sleepy tasks whose
/// completion order should follow their wake times, not their submission order.
fn run_task_engine_demo(workers: usize) {
    info!(workers, "starting task engine demo");

    let pool = ThreadPool::start(ThreadPoolConfig {
        num_priority_levels: 3,
        num_workers: workers,
        max_queue_size: 1_000,
        submit_cycle_attempts: workers,
        max_wait_duration: Duration::from_millis(50),
    });

    let completed = Arc::new(AtomicUsize::new(0));
    for priority in [0u8, 1, 2] {
        for n in 0..5 {
            let completed = completed.clone();
            pool.submit(SimpleTask::new(priority, move || {
                info!(priority, n, "ran simple task");
                completed.fetch_add(1, Ordering::SeqCst);
                TaskResult::Empty
            }));
        }
    }

    for (id, delay_ms) in [(1u32, 30u64), (2, 10), (3, 20)] {
        pool.submit_sleepy(
            SimpleTask::new(0, move || {
                info!(id, "ran sleepy task");
                TaskResult::Empty
            }),
            WakeTime::relative(Duration::from_millis(delay_ms)),
        );
    }

    while completed.load(Ordering::SeqCst) < 15 {
        std::thread::sleep(Duration::from_millis(10));
    }
    // Give the three sleepy tasks time to fire before shutting the pool down.
    std::thread::sleep(Duration::from_millis(100));

    pool.shut_down_and_join();
    info!("task engine demo complete");
}

/// Drives the scan state machine to completion against a mock chain, optionally applying a reorg
/// after the initial full scan to demonstrate the `NeedPartialscan`/`NeedFullscan` retry path.
fn run_scan_demo(num_blocks: u8, reorg_at: u8, max_chunk_size: u64) -> eyre::Result<()> {
    let chain: Vec<BlockId> = (0..num_blocks).map(block).collect();
    let mut ledger = MockLedger::new(chain);
    let mut consumer = MockConsumer::new(0);
    let mut metadata =
        ScanMachineMetadata::new(ScanMachineConfig { max_chunk_size, ..Default::default() });

    info!(num_blocks, max_chunk_size, "starting initial scan");
    while try_advance_state_machine(&mut metadata, &mut ledger, &mut consumer) {
        info!(status = ?metadata.status, "scan machine transition");
    }
    info!(status = ?metadata.status, tip = ?consumer.tip_index(), "initial scan finished");

    if reorg_at > 0 && (reorg_at as usize) < num_blocks as usize {
        info!(reorg_at, "applying reorg and rescanning");
        ledger.apply_reorg(reorg_at as u64, vec![block(reorg_at.wrapping_add(200))]);

        metadata.status = tn_scanner::ScanMachineStatus::NeedPartialscan;
        while try_advance_state_machine(&mut metadata, &mut ledger, &mut consumer) {
            info!(status = ?metadata.status, "scan machine transition");
        }
        info!(status = ?metadata.status, tip = ?consumer.tip_index(), "rescan finished");
    }

    info!(tip_ids = ?consumer.tip_ids(), "final consumer state");
    Ok(())
}
