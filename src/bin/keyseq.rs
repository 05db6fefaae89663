//! keyseq CLI: drive a keyed workload through the engine and check ordering.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use keyseq::bounded::{BoundedStrategy, KeySequentialBoundedExecutor};
use keyseq::config::Config;
use keyseq::executor::{Executor, ThreadPool, TokioExecutor};
use keyseq::keyed::{KeySequentialExecutor, KeyedExecutor, KeyedTask};
use keyseq::runner::{FailureHandler, TaskFailure};
use keyseq::synchronized::KeySynchronizedExecutor;
use keyseq::telemetry::{TelemetryConfig, init_telemetry};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "keyseq", about = "Key-sequential task execution")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a keyed workload and verify per-key ordering
    Run {
        /// Number of distinct keys
        #[arg(long, default_value_t = 4)]
        keys: u64,
        /// Total number of tasks
        #[arg(long, default_value_t = 1000)]
        tasks: u64,
        /// Simulated work per task, in microseconds
        #[arg(long, default_value_t = 0)]
        work_us: u64,
        /// Make every Nth task panic (0 disables)
        #[arg(long, default_value_t = 0)]
        panic_every: u64,
        /// Underlying executor
        #[arg(long, value_enum, default_value_t = Backend::Pool)]
        executor: Backend,
        /// Run consecutive tasks of a key on the same worker thread
        #[arg(long)]
        synchronized: bool,
        /// Worker threads (overrides config)
        #[arg(long)]
        threads: Option<usize>,
        /// Cap on in-flight tasks (overrides config)
        #[arg(long)]
        max_in_flight: Option<usize>,
        /// Admission strategy at capacity (overrides config)
        #[arg(long)]
        strategy: Option<BoundedStrategy>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Pool,
    Tokio,
}

#[derive(Serialize)]
struct Summary {
    tasks: u64,
    keys: u64,
    executed: u64,
    failed: u64,
    rejected: u64,
    elapsed_ms: u128,
    ordered: bool,
    completed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run {
            keys,
            tasks,
            work_us,
            panic_every,
            executor,
            synchronized,
            threads,
            max_in_flight,
            strategy,
            timeout_secs,
            json,
        } => {
            let config = Config {
                threads: threads.unwrap_or(config.threads),
                max_in_flight: max_in_flight.or(config.max_in_flight),
                strategy: strategy.unwrap_or(config.strategy),
                ..config
            };
            let workload = Workload {
                keys: keys.max(1),
                tasks,
                work: Duration::from_micros(work_us),
                panic_every,
                timeout: Duration::from_secs(timeout_secs),
            };
            cmd_run(config, workload, executor, synchronized, json).await
        }
    }
}

struct Workload {
    keys: u64,
    tasks: u64,
    work: Duration,
    panic_every: u64,
    timeout: Duration,
}

async fn cmd_run(
    config: Config,
    workload: Workload,
    backend: Backend,
    synchronized: bool,
    json: bool,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "keyseq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let pool = match backend {
        Backend::Pool => Some(Arc::new(ThreadPool::new(config.threads)?)),
        Backend::Tokio => None,
    };
    let underlying: Arc<dyn Executor> = match &pool {
        Some(pool) => pool.clone(),
        None => Arc::new(TokioExecutor::current()),
    };

    let failed = Arc::new(AtomicU64::new(0));
    let handler: FailureHandler<u64> = {
        let failed = Arc::clone(&failed);
        Arc::new(move |key: &u64, failure: TaskFailure| {
            warn!(key, %failure, "task failed");
            failed.fetch_add(1, Ordering::Relaxed);
        })
    };

    let bounded = config.max_in_flight.map(|max| {
        Arc::new(KeySequentialBoundedExecutor::with_handler(
            max,
            config.strategy,
            underlying.clone(),
            handler.clone(),
        ))
    });
    let keyed: Arc<dyn KeyedExecutor<u64>> = match (&bounded, synchronized) {
        (Some(bounded), _) => bounded.clone(),
        (None, true) => Arc::new(KeySynchronizedExecutor::with_handler(
            underlying.clone(),
            handler,
        )),
        (None, false) => Arc::new(KeySequentialExecutor::with_handler(
            underlying.clone(),
            handler,
        )),
    };

    info!(
        keys = workload.keys,
        tasks = workload.tasks,
        threads = config.threads,
        max_in_flight = ?config.max_in_flight,
        "starting run"
    );

    let seen: Arc<Mutex<BTreeMap<u64, Vec<u64>>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let remaining = Arc::new(AtomicUsize::new(workload.tasks as usize));
    let done = Arc::new(Notify::new());
    if workload.tasks == 0 {
        done.notify_one();
    }

    let started = Instant::now();
    let submitter = {
        let keyed = Arc::clone(&keyed);
        let seen = Arc::clone(&seen);
        let remaining = Arc::clone(&remaining);
        let done = Arc::clone(&done);
        let (keys, count, work, panic_every) = (
            workload.keys,
            workload.tasks,
            workload.work,
            workload.panic_every,
        );
        // Submission can block under the `block` strategy.
        tokio::task::spawn_blocking(move || {
            let mut rejected = 0u64;
            for i in 0..count {
                let key = i % keys;
                let task = {
                    let seen = Arc::clone(&seen);
                    let remaining = Arc::clone(&remaining);
                    let done = Arc::clone(&done);
                    KeyedTask::new(key, move || {
                        if !work.is_zero() {
                            std::thread::sleep(work);
                        }
                        seen.lock().entry(key).or_default().push(i);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            done.notify_one();
                        }
                        if panic_every > 0 && (i + 1) % panic_every == 0 {
                            panic!("task {i} for key {key} failed on purpose");
                        }
                    })
                };
                if let Err(e) = keyed.execute(task) {
                    rejected += 1;
                    warn!(key, error = %e, "submission refused");
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        done.notify_one();
                    }
                }
            }
            rejected
        })
    };

    let rejected = submitter.await?;
    let completed = tokio::time::timeout(workload.timeout, done.notified())
        .await
        .is_ok();
    if let Some(bounded) = &bounded {
        let bounded = Arc::clone(bounded);
        let timeout = workload.timeout;
        if !tokio::task::spawn_blocking(move || bounded.drain(timeout)).await? {
            warn!("bounded executor did not drain in time");
        }
    }
    let elapsed_ms = started.elapsed().as_millis();

    let (executed, ordered) = {
        let seen = seen.lock();
        let executed = seen.values().map(|v| v.len() as u64).sum();
        let ordered = seen
            .values()
            .all(|indices| indices.windows(2).all(|w| w[0] < w[1]));
        (executed, ordered)
    };
    let summary = Summary {
        tasks: workload.tasks,
        keys: workload.keys,
        executed,
        failed: failed.load(Ordering::Relaxed),
        rejected,
        elapsed_ms,
        ordered,
        completed,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("tasks:     {}", summary.tasks);
        println!("keys:      {}", summary.keys);
        println!("executed:  {}", summary.executed);
        println!("failed:    {}", summary.failed);
        println!("rejected:  {}", summary.rejected);
        println!("elapsed:   {}ms", summary.elapsed_ms);
        println!("ordered:   {}", if summary.ordered { "yes" } else { "NO" });
    }

    if let Some(pool) = pool {
        pool.shutdown();
        pool.await_termination(workload.timeout);
    }

    if !completed {
        anyhow::bail!("workload did not finish within {:?}", workload.timeout);
    }
    if !ordered {
        anyhow::bail!("per-key ordering violated");
    }
    Ok(())
}
