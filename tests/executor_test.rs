//! Integration tests for the underlying executors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use keyseq::error::RejectedExecution;
use keyseq::executor::{Executor, ThreadPool, TokioExecutor};
use keyseq::runner::KeySequentialRunner;

const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ThreadPool
// ---------------------------------------------------------------------------

#[test]
fn pool_runs_queued_jobs_before_terminating() {
    let pool = ThreadPool::new(2).unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let count = Arc::clone(&count);
        pool.execute(Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(count.load(Ordering::SeqCst), 100);
    assert_eq!(pool.pending(), 0);
}

#[test]
fn pool_rejects_after_shutdown() {
    let pool = ThreadPool::new(1).unwrap();
    pool.shutdown();
    let err = pool.execute(Box::new(|| {})).unwrap_err();
    assert_eq!(err, RejectedExecution::Shutdown);
}

#[test]
fn pool_survives_panicking_jobs() {
    let pool = ThreadPool::new(1).unwrap();
    let (tx, rx) = mpsc::channel::<()>();

    pool.execute(Box::new(|| panic!("job failure"))).unwrap();
    pool.execute(Box::new(move || tx.send(()).unwrap())).unwrap();

    rx.recv_timeout(TIMEOUT).unwrap();
}

#[test]
fn pool_names_its_workers() {
    let pool = ThreadPool::with_name(1, "orders").unwrap();
    let (tx, rx) = mpsc::channel::<Option<String>>();
    pool.execute(Box::new(move || {
        tx.send(std::thread::current().name().map(str::to_string))
            .unwrap();
    }))
    .unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().as_deref(), Some("orders-0"));
}

#[test]
fn await_termination_times_out_while_a_job_runs() {
    let pool = ThreadPool::new(1).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.execute(Box::new(move || {
        let _ = release_rx.recv_timeout(TIMEOUT);
    }))
    .unwrap();

    pool.shutdown();
    assert!(!pool.await_termination(Duration::from_millis(20)));
    release_tx.send(()).unwrap();
    assert!(pool.await_termination(TIMEOUT));
}

// ---------------------------------------------------------------------------
// TokioExecutor
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn tokio_executor_runs_jobs_on_the_blocking_pool() {
    let executor = TokioExecutor::current();
    let (tx, rx) = tokio::sync::oneshot::channel::<usize>();

    executor
        .execute(Box::new(move || {
            let _ = tx.send(42);
        }))
        .unwrap();

    assert_eq!(tokio::time::timeout(TIMEOUT, rx).await.unwrap().unwrap(), 42);
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_tokio_executor_rejects() {
    let executor = TokioExecutor::current();
    executor.close();
    assert!(executor.is_closed());
    assert_eq!(
        executor.execute(Box::new(|| {})).unwrap_err(),
        RejectedExecution::Shutdown
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn runner_over_tokio_keeps_per_key_order() {
    let runner = KeySequentialRunner::new(Arc::new(TokioExecutor::current()));
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

    for i in 0..200u32 {
        let seen = Arc::clone(&seen);
        runner.run("k", move || seen.lock().push(i)).unwrap();
    }
    runner
        .run("k", move || {
            let _ = done_tx.send(());
        })
        .unwrap();

    tokio::time::timeout(TIMEOUT, done_rx).await.unwrap().unwrap();
    assert_eq!(*seen.lock(), (0..200).collect::<Vec<_>>());
}
