//! # Error types used by the jobvisor runtime and factories.
//!
//! [`PmError`] covers failures of the process manager itself; [`FactoryError`]
//! covers handler factories failing to build a runnable process. Admission
//! failures (unknown command, duplicate id) are *not* surfaced as errors to
//! submitters (the manager synthesizes results for those) but they share
//! these types internally.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the process manager runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PmError {
    /// Command name has no registered factory.
    #[error("unknown command '{name}'")]
    UnknownCommand {
        /// The unresolved handler name.
        name: String,
    },
    /// A live runner already exists with the same command id.
    #[error("duplicate job id '{id}'")]
    DuplicateId {
        /// The conflicting command id.
        id: String,
    },
    /// The submission channel is closed (the manager was shut down).
    #[error("process manager is not accepting commands")]
    Closed,
    /// `run()` was invoked more than once.
    #[error("process manager is already running")]
    AlreadyRunning,
    /// Shutdown grace period elapsed with runners still live.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the commands that did not terminate in time.
        stuck: Vec<String>,
    },
}

impl PmError {
    /// Short stable label (snake_case) for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PmError::UnknownCommand { .. } => "pm_unknown_command",
            PmError::DuplicateId { .. } => "pm_duplicate_id",
            PmError::Closed => "pm_closed",
            PmError::AlreadyRunning => "pm_already_running",
            PmError::GraceExceeded { .. } => "pm_grace_exceeded",
        }
    }
}

/// Errors produced while building a runnable process from a command.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FactoryError {
    /// The command is structurally unusable for this factory.
    #[error("invalid command: {0}")]
    InvalidSpec(String),
    /// Spawning or wiring the child failed.
    #[error("process setup failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FactoryError {
    /// Short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            FactoryError::InvalidSpec(_) => "factory_invalid_spec",
            FactoryError::Io(_) => "factory_io",
        }
    }
}
