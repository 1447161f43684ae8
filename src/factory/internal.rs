//! # In-process handlers.
//!
//! An [`InternalRoutine`] runs inside the agent: it receives the command and
//! a [`RunContext`] and returns the [`JobResult`] directly. No child PID
//! exists, so the reaper is never involved and cancellation is cooperative:
//! routines are expected to check the context between units of work.
//!
//! [`InternalFn`] wraps an async closure into a routine, the way
//! function-backed tasks are built elsewhere in this codebase:
//!
//! ```
//! use jobvisor::{InternalFn, JobResult, JobState};
//!
//! let factory = InternalFn::arc(|cmd, _ctx| async move {
//!     JobResult::new(&cmd, JobState::Success).with_data("pong")
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::FactoryError,
    factory::{Factory, JobProcess},
    jobs::{Command, JobResult, Message},
};

/// Execution context handed to internal routines.
pub struct RunContext {
    cmd_id: String,
    token: CancellationToken,
    messages: mpsc::UnboundedSender<Message>,
}

impl RunContext {
    pub(crate) fn new(
        cmd_id: impl Into<String>,
        token: CancellationToken,
        messages: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            token,
            messages,
        }
    }

    /// True once the job has been killed or timed out; routines should
    /// return promptly after observing this.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the job is killed or times out.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Emits a log message on the job's message path.
    pub fn message(&self, level: u8, text: impl Into<String>) {
        let _ = self
            .messages
            .send(Message::new(self.cmd_id.clone(), level, text));
    }
}

/// An asynchronous in-process command handler.
#[async_trait]
pub trait InternalRoutine: Send + Sync + 'static {
    /// Runs the command to completion (or until cancellation) and returns
    /// its result. Timing fields are stamped by the runner.
    async fn invoke(&self, cmd: Command, ctx: RunContext) -> JobResult;
}

/// Factory wrapping any [`InternalRoutine`].
pub struct InternalFactory {
    routine: Arc<dyn InternalRoutine>,
}

impl InternalFactory {
    /// Wraps a routine for registration.
    pub fn arc(routine: Arc<dyn InternalRoutine>) -> Arc<dyn Factory> {
        Arc::new(Self { routine })
    }
}

impl Factory for InternalFactory {
    fn build(&self, _cmd: &Command) -> Result<JobProcess, FactoryError> {
        Ok(JobProcess::Internal(InternalProcess {
            routine: self.routine.clone(),
        }))
    }
}

/// Function-backed routine.
///
/// The closure is invoked once per accepted command; it must be `Fn` because
/// a registered handler serves many commands over its lifetime.
pub struct InternalFn<F, Fut>
where
    F: Fn(Command, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    func: F,
}

impl<F, Fut> InternalFn<F, Fut>
where
    F: Fn(Command, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    /// Wraps a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }

    /// Wraps a closure and returns it ready for registration.
    pub fn arc(func: F) -> Arc<dyn Factory> {
        InternalFactory::arc(Arc::new(Self::new(func)))
    }
}

#[async_trait]
impl<F, Fut> InternalRoutine for InternalFn<F, Fut>
where
    F: Fn(Command, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn invoke(&self, cmd: Command, ctx: RunContext) -> JobResult {
        (self.func)(cmd, ctx).await
    }
}

/// A built in-process routine, ready for the runner to invoke.
pub struct InternalProcess {
    /// The routine shared with the registered factory.
    pub routine: Arc<dyn InternalRoutine>,
}

impl std::fmt::Debug for InternalProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalProcess").finish_non_exhaustive()
    }
}
