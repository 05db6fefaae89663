//! Error types for keyseq.

use thiserror::Error;

/// Refusal signalled synchronously by an [`Executor`](crate::executor::Executor)
/// instead of accepting a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectedExecution {
    #[error("executor has been shut down")]
    Shutdown,

    #[error("executor is at capacity")]
    Saturated,

    #[error("executor is draining")]
    Draining,
}

impl RejectedExecution {
    /// Short stable label for logs and metric attributes.
    pub fn as_label(&self) -> &'static str {
        match self {
            RejectedExecution::Shutdown => "shutdown",
            RejectedExecution::Saturated => "saturated",
            RejectedExecution::Draining => "draining",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("task must not be empty")]
    MissingTask,

    /// The first dispatch for a newly armed key was refused.
    #[error("task for the key '{key}' rejected")]
    KeyRejected {
        key: String,
        #[source]
        source: RejectedExecution,
    },

    #[error(transparent)]
    Rejected(#[from] RejectedExecution),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The rejection behind this error, if it is one.
    pub fn rejection(&self) -> Option<RejectedExecution> {
        match self {
            Error::KeyRejected { source, .. } => Some(*source),
            Error::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
