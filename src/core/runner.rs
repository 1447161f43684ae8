//! # Runner: one live execution.
//!
//! A runner drives a single accepted command from start to its terminal
//! transition and delivers exactly one result. External children are
//! spawned under the reaper's registration lock, their stdio is parsed
//! line-by-line into messages, and a meter samples them every
//! `stats_interval`. Internal routines run in-process with cooperative
//! cancellation.
//!
//! ```text
//!            ┌───────────────────────── select loop ─────────────────────────┐
//!  messages ─┤► fan-out            kill token ──► SIGTERM ──grace──► SIGKILL │
//!  meter tick┤► statsd ─► flush    max_time  ──► same kill path, TIMEOUT     │
//!  status ───┤► terminal state                                               │
//!            └──────────────► drain messages ─► result ─► hooks ─► cleanup ──┘
//! ```
//!
//! ## Rules
//! - The result is delivered after every message of the runner.
//! - Terminal order: result fan-out, exit hooks, live-set removal, queue
//!   notify; the scheduler slot frees only after all of that.
//! - `Kill` is idempotent: the first call arms the escalation, later calls
//!   are no-ops.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::{manager::ProcessManager, meter::Meter, reaper::Reaper},
    factory::{ExternalProcess, InternalProcess, JobProcess, RunContext},
    jobs::{Command, JobResult, JobState, Message},
    stats::Statsd,
};

/// Hook invoked with the job's success flag.
pub type ExitHook = Arc<dyn Fn(bool) + Send + Sync>;

/// Sleep target for select arms that are currently disarmed.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}

pub(crate) struct Runner {
    pm: ProcessManager,
    cmd: Command,
    kill_token: CancellationToken,
    hooks: Vec<ExitHook>,
    hooks_on_exit: bool,
}

impl Runner {
    pub(crate) fn new(
        pm: ProcessManager,
        cmd: Command,
        kill_token: CancellationToken,
        hooks_on_exit: bool,
        hooks: Vec<ExitHook>,
    ) -> Self {
        Self {
            pm,
            cmd,
            kill_token,
            hooks,
            hooks_on_exit,
        }
    }

    /// Runs the process to its terminal transition.
    ///
    /// Delivers the single result, fires exit hooks, and unregisters the
    /// runner. The caller keeps the scheduler slot alive until this
    /// returns.
    pub(crate) async fn run(self, process: JobProcess) {
        let started = SystemTime::now();
        let result = match process {
            JobProcess::External(p) => self.run_external(p).await,
            JobProcess::Internal(p) => self.run_internal(p).await,
        };
        let result = result.with_timing(started);
        let success = result.state == JobState::Success;

        debug!(cmd = %self.cmd, state = result.state.as_label(), "job finished");
        self.pm.result(&self.cmd, result).await;
        self.fire_hooks(success);
        self.pm.cleanup(&self.cmd).await;
    }

    /// Invokes hooks in registration order with the outcome.
    fn fire_hooks(&self, success: bool) {
        for hook in &self.hooks {
            hook(success);
        }
    }

    /// Fires "observed up" hooks for services (`hooks_on_exit == false`).
    fn fire_up_hooks(&self) {
        if !self.hooks_on_exit {
            self.fire_hooks(true);
        }
    }

    async fn run_external(&self, spec: ExternalProcess) -> JobResult {
        let mut os_cmd = spec.command();
        let (mut child, mut status_rx) = match Reaper::register_spawn(&mut os_cmd) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(cmd = %self.cmd, %err, "spawn failed");
                return JobResult::new(&self.cmd, JobState::Error)
                    .with_data(format!("spawn failed: {err}"));
            }
        };
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            let payload = spec.stdin_data.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(err) = stdin.write_all(payload.as_bytes()) {
                    warn!(%err, "cannot write job payload to child stdin");
                }
            });
        }

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, self.cmd.id.clone(), msg_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, self.cmd.id.clone(), msg_tx.clone());
        }
        drop(msg_tx);

        self.fire_up_hooks();

        let interval = match self.cmd.args.stats_interval() {
            0 => self.pm.config().stats_interval,
            secs => Duration::from_secs(secs),
        };
        let meter_on = !interval.is_zero();
        let mut meter = Meter::new(pid);
        let statsd = Statsd::new(format!("cmd.{}", self.cmd.id));
        let tick_every = interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + tick_every, tick_every);

        let max_time = self.cmd.args.max_time();
        let has_deadline = max_time > 0;
        let deadline = tokio::time::sleep_until(if has_deadline {
            Instant::now() + Duration::from_secs(max_time as u64)
        } else {
            far_future()
        });
        tokio::pin!(deadline);

        let escalate = tokio::time::sleep_until(far_future());
        tokio::pin!(escalate);
        let mut escalate_armed = false;

        let mut cause: Option<JobState> = None;
        let mut msgs_open = true;

        let status = loop {
            tokio::select! {
                maybe = msg_rx.recv(), if msgs_open => match maybe {
                    Some(msg) => self.pm.message(&self.cmd, msg).await,
                    None => msgs_open = false,
                },
                status = &mut status_rx => break status.ok(),
                _ = self.kill_token.cancelled(), if cause.is_none() => {
                    cause = Some(JobState::Killed);
                    signal_child(pid, Signal::SIGTERM);
                    escalate.as_mut().reset(Instant::now() + self.pm.config().kill_grace);
                    escalate_armed = true;
                }
                _ = &mut deadline, if has_deadline && cause.is_none() => {
                    debug!(cmd = %self.cmd, max_time, "wall clock exceeded, killing");
                    cause = Some(JobState::Timeout);
                    signal_child(pid, Signal::SIGTERM);
                    escalate.as_mut().reset(Instant::now() + self.pm.config().kill_grace);
                    escalate_armed = true;
                }
                _ = &mut escalate, if escalate_armed => {
                    escalate_armed = false;
                    signal_child(pid, Signal::SIGKILL);
                }
                _ = ticker.tick(), if meter_on => {
                    meter.sample(&statsd);
                    if let Some(stats) = statsd.flush() {
                        self.pm.stats(&stats).await;
                    }
                }
            }
        };

        // The readers close on EOF, so this terminates once the child (and
        // anything inheriting its pipes) is gone. Result after all messages.
        while let Some(msg) = msg_rx.recv().await {
            self.pm.message(&self.cmd, msg).await;
        }
        if let Some(stats) = statsd.flush() {
            self.pm.stats(&stats).await;
        }

        self.terminal_result(cause, status)
    }

    fn terminal_result(&self, cause: Option<JobState>, status: Option<WaitStatus>) -> JobResult {
        if let Some(state) = cause {
            return JobResult::new(&self.cmd, state);
        }
        match status {
            Some(WaitStatus::Exited(_, 0)) => JobResult::new(&self.cmd, JobState::Success),
            Some(WaitStatus::Exited(_, code)) => {
                JobResult::new(&self.cmd, JobState::Error).with_data(format!("exit code {code}"))
            }
            Some(WaitStatus::Signaled(_, sig, _)) => {
                JobResult::new(&self.cmd, JobState::Killed).with_data(format!("terminated by {sig}"))
            }
            _ => JobResult::new(&self.cmd, JobState::Error).with_data("wait-status lost"),
        }
    }

    async fn run_internal(&self, process: InternalProcess) -> JobResult {
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let routine_token = self.kill_token.child_token();
        let ctx = RunContext::new(self.cmd.id.clone(), routine_token.clone(), msg_tx);

        self.fire_up_hooks();

        let routine = process.routine;
        let invoke = routine.invoke(self.cmd.clone(), ctx);
        tokio::pin!(invoke);

        let max_time = self.cmd.args.max_time();
        let has_deadline = max_time > 0;
        let deadline = tokio::time::sleep_until(if has_deadline {
            Instant::now() + Duration::from_secs(max_time as u64)
        } else {
            far_future()
        });
        tokio::pin!(deadline);

        let mut cause: Option<JobState> = None;
        let mut msgs_open = true;

        let mut result = loop {
            tokio::select! {
                maybe = msg_rx.recv(), if msgs_open => match maybe {
                    Some(msg) => self.pm.message(&self.cmd, msg).await,
                    None => msgs_open = false,
                },
                result = &mut invoke => break result,
                _ = self.kill_token.cancelled(), if cause.is_none() => {
                    // The routine token is a child of the kill token, so the
                    // routine observes the cancellation on its own.
                    cause = Some(JobState::Killed);
                }
                _ = &mut deadline, if has_deadline && cause.is_none() => {
                    debug!(cmd = %self.cmd, max_time, "wall clock exceeded, cancelling routine");
                    cause = Some(JobState::Timeout);
                    routine_token.cancel();
                }
            }
        };

        while let Some(msg) = msg_rx.recv().await {
            self.pm.message(&self.cmd, msg).await;
        }

        if let Some(state) = cause {
            result.state = state;
        }
        result
    }
}

/// Sends a signal to the child, tolerating an already-gone process.
fn signal_child(pid: u32, signal: Signal) {
    if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
        debug!(pid, %signal, %err, "signal not delivered");
    }
}

/// Parses one captured stream line-by-line into messages.
fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    cmd_id: String,
    tx: mpsc::UnboundedSender<Message>,
) {
    tokio::task::spawn_blocking(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(Message::parse(&cmd_id, &line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    // Stream errors do not fail the job; its state is
                    // decided by the exit status alone.
                    warn!(cmd_id = %cmd_id, %err, "job output stream error");
                    break;
                }
            }
        }
    });
}
