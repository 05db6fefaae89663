//! # keyseq
//!
//! Key-sequential task execution. Tasks submitted under the same key run
//! strictly in submission order, one at a time; tasks under different keys
//! run concurrently on an underlying [`Executor`](executor::Executor).
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyseq::executor::ThreadPool;
//! use keyseq::runner::KeySequentialRunner;
//!
//! let pool = Arc::new(ThreadPool::new(8)?);
//! let runner = KeySequentialRunner::new(pool.clone());
//!
//! runner.run("trade-327", || { /* first message for 327 */ })?;
//! runner.run("trade-831", || { /* not blocked by 327 */ })?;
//! runner.run("trade-327", || { /* starts after the first one finishes */ })?;
//! # Ok::<(), keyseq::error::Error>(())
//! ```

pub mod bounded;
pub mod config;
pub mod error;
pub mod executor;
pub mod keyed;
pub mod runner;
pub mod synchronized;
pub mod telemetry;

pub use bounded::{BoundedExecutor, BoundedStrategy, KeySequentialBoundedExecutor};
pub use error::{Error, RejectedExecution, Result};
pub use keyed::{KeySequentialExecutor, KeyedExecutor, KeyedTask};
pub use runner::{KeySequentialRunner, TaskFailure};
pub use synchronized::KeySynchronizedExecutor;
