//! Integration tests for the key-synchronized executor.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use keyseq::error::Error;
use keyseq::executor::ThreadPool;
use keyseq::keyed::{KeyedExecutor, KeyedTask};
use keyseq::runner::TaskFailure;
use keyseq::synchronized::KeySynchronizedExecutor;
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(5);

fn pool(threads: usize) -> Arc<ThreadPool> {
    Arc::new(ThreadPool::new(threads).expect("failed to start pool"))
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn queued_tasks_for_a_key_stay_on_one_thread() {
    let executor = KeySynchronizedExecutor::new(pool(8));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    executor
        .run("k", move || {
            release_rx.recv_timeout(TIMEOUT).unwrap();
            s.lock().push((0, thread::current().id()));
        })
        .unwrap();
    for i in 1..50 {
        let s = Arc::clone(&seen);
        executor
            .run("k", move || s.lock().push((i, thread::current().id())))
            .unwrap();
    }

    release_tx.send(()).unwrap();
    assert!(wait_until(|| executor.active_keys() == 0));

    let seen = seen.lock();
    let order: Vec<i32> = seen.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    let threads: HashSet<ThreadId> = seen.iter().map(|(_, id)| *id).collect();
    assert_eq!(threads.len(), 1);
}

#[test]
fn different_keys_are_not_serialized() {
    let executor = KeySynchronizedExecutor::new(pool(4));
    let barrier = Arc::new(std::sync::Barrier::new(3));
    let (done_tx, done_rx) = mpsc::channel::<u8>();

    for key in 0u8..3 {
        let barrier = Arc::clone(&barrier);
        let done_tx = done_tx.clone();
        executor
            .run(key, move || {
                barrier.wait();
                done_tx.send(key).unwrap();
            })
            .unwrap();
    }

    let mut done: Vec<u8> = (0..3).map(|_| done_rx.recv_timeout(TIMEOUT).unwrap()).collect();
    done.sort_unstable();
    assert_eq!(done, vec![0, 1, 2]);
}

#[test]
fn panics_are_reported_and_the_key_keeps_going() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let executor = KeySynchronizedExecutor::with_handler(
        pool(2),
        Arc::new(move |key: &u32, failure: TaskFailure| {
            sink.lock().push((*key, failure.to_string()));
        }),
    );

    executor.run(9, || panic!("bad input")).unwrap();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    executor.run(9, move || done_tx.send(()).unwrap()).unwrap();

    done_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(
        *failures.lock(),
        vec![(9, "task panicked: bad input".to_string())]
    );
}

#[test]
fn missing_task_is_rejected() {
    let executor: KeySynchronizedExecutor<u32> = KeySynchronizedExecutor::new(pool(1));
    let err = executor.execute(KeyedTask::from_parts(1, None)).unwrap_err();
    assert!(matches!(err, Error::MissingTask));
    assert_eq!(executor.active_keys(), 0);
}

#[test]
fn registry_is_empty_after_work_completes() {
    let executor = KeySynchronizedExecutor::new(pool(4));
    let (done_tx, done_rx) = mpsc::channel::<()>();

    for key in 0..100u32 {
        let done_tx = done_tx.clone();
        executor
            .run(key % 7, move || done_tx.send(()).unwrap())
            .unwrap();
    }
    for _ in 0..100 {
        done_rx.recv_timeout(TIMEOUT).unwrap();
    }

    assert!(wait_until(|| executor.active_keys() == 0));
}
