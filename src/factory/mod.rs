//! # Handler factories: from a command to a runnable process.
//!
//! A [`Factory`] inspects a [`Command`] and produces a [`JobProcess`]: either
//! an external child process description or an in-process routine. Factories
//! are registered by name in the [`HandlerRegistry`]; lookup failure is what
//! turns into an `UNKNOWN_CMD` result upstream.

mod external;
mod internal;
mod registry;

pub use external::{ExternalFactory, ExternalProcess};
pub use internal::{InternalFactory, InternalFn, InternalProcess, InternalRoutine, RunContext};
pub use registry::HandlerRegistry;

use crate::{error::FactoryError, jobs::Command};

/// Builds a runnable process for a command.
///
/// Implementations must be cheap and side-effect free: the actual spawn (and
/// PID registration) happens later, inside the runner, so that registration
/// can be made atomic with process start.
pub trait Factory: Send + Sync + 'static {
    /// Produces the process description for `cmd`.
    fn build(&self, cmd: &Command) -> Result<JobProcess, FactoryError>;
}

/// A runnable process produced by a factory.
#[derive(Debug)]
pub enum JobProcess {
    /// A child binary; stdio is captured and parsed into messages, the PID
    /// is registered with the reaper, and the meter samples it.
    External(ExternalProcess),
    /// An in-process routine; no child PID exists and the reaper is not
    /// involved. Cancellation is cooperative.
    Internal(InternalProcess),
}
