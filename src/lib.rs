//! # jobvisor
//!
//! **Jobvisor** is the process manager of a node agent: a long-running
//! per-machine service that accepts job descriptions from remote
//! controllers, executes them as child processes or in-process handlers,
//! meters their resource usage, and streams structured output back.
//!
//! ## Features
//!
//! | Area            | Description                                                       | Key types / traits                          |
//! |-----------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Scheduling**  | Bounded admission from two sources under a global in-flight cap.  | [`ProcessManager`], [`Config`]              |
//! | **Queues**      | Named FIFOs releasing one command at a time per queue.            | [`CmdQueueManager`]                         |
//! | **Execution**   | Child processes (reaped via SIGCHLD) and in-process routines.     | [`ExternalFactory`], [`InternalFn`]         |
//! | **Startup**     | Dependency-ordered service slices.                                | [`StartupEntry`], [`StateMachine`]          |
//! | **Fan-out**     | Message / result / stats handler lists, invoked in order.         | [`MessageHandler`], [`ResultHandler`], [`StatsFlushHandler`] |
//! | **Persistence** | Monotonic message ids and a replay log for indefinite jobs.       | [`History`]                                 |
//!
//! ```no_run
//! use std::time::Duration;
//! use jobvisor::{Command, Config, InternalFn, JobResult, JobState, ProcessManager, ResultFn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pm = ProcessManager::new(Config::default());
//!     jobvisor::register_builtins(&pm);
//!
//!     pm.register(
//!         "ping",
//!         InternalFn::arc(|cmd, _ctx| async move {
//!             JobResult::new(&cmd, JobState::Success).with_data("pong")
//!         }),
//!     );
//!     pm.add_result_handler(ResultFn::arc(|_cmd, result| async move {
//!         println!("{} -> {}", result.cmd_id, result.state);
//!     }));
//!
//!     pm.run()?;
//!     pm.push_cmd(Command::new("job-1", "ping")).await?;
//!
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//!     pm.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

pub mod builtin;
mod config;
mod core;
mod error;
mod events;
mod factory;
mod history;
mod jobs;
mod shutdown;
mod stats;

// ---- Public re-exports ----

pub use builtin::register_builtins;
pub use config::Config;
pub use core::{CmdQueueManager, ExitHook, ProcessManager, Reaper, StartupEntry, StateMachine};
pub use error::{FactoryError, PmError};
pub use events::{
    MessageFn, MessageHandler, ResultFn, ResultHandler, StatsFlushHandler, StatsFn,
};
pub use factory::{
    ExternalFactory, Factory, HandlerRegistry, InternalFactory, InternalFn, InternalRoutine,
    JobProcess, RunContext,
};
pub use history::History;
pub use jobs::{levels, Args, Command, JobResult, JobState, Message};
pub use shutdown::wait_for_shutdown_signal;
pub use stats::{Stats, Statsd};
