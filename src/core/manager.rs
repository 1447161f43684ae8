//! # The process manager.
//!
//! [`ProcessManager`] ties the whole runtime together: it accepts commands
//! from the direct channel and the queue manager, admits them under the
//! global in-flight cap, supervises runners, and owns the event fan-out.
//! It is a cheap clone handle over shared state; runners and background
//! tasks carry their own clones.
//!
//! ## Architecture
//! ```text
//! push_cmd ──────────► [direct channel] ──┐
//! push_cmd_to_queue ─► [queue manager] ───┤► schedule loop ──► admit
//!                                         │   (slot gate)       ├─ unknown / duplicate ─► synthetic result
//! run_cmd / run_slice ─────────────────────► admit (own slot)   └─ spawn Runner task
//!
//! Runner ──messages/results/stats──► FanOut ──► registered handlers
//! Reaper ──wait-status──► Runner
//! ```
//!
//! ## Rules
//! - At most `max_jobs` runners are live; a slot is taken before a command
//!   is pulled from either source and freed only after the runner's
//!   terminal cleanup.
//! - Admission failures never reach the submitter as errors; they are
//!   synthesized into results on the fan-out.
//! - A queued command that fails admission still advances its queue,
//!   otherwise the queue would stall forever.
//! - Selection between the two sources is not fair, only eventually served.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    core::{
        deps::{StartupEntry, StateMachine},
        mid::MessageIdAllocator,
        queue::CmdQueueManager,
        reaper::Reaper,
        runner::{ExitHook, Runner},
    },
    error::PmError,
    events::{FanOut, MessageHandler, ResultHandler, StatsFlushHandler},
    factory::{Factory, HandlerRegistry},
    jobs::{Command, JobResult, JobState, Message},
    shutdown,
    stats::Stats,
};

/// Live-runner bookkeeping: the command and its kill signal.
struct RunnerHandle {
    cmd: Command,
    kill: CancellationToken,
}

/// Command sources consumed by the schedule loop, taken once by `run()`.
struct Sources {
    direct: mpsc::Receiver<Command>,
    queued: mpsc::UnboundedReceiver<Command>,
}

struct Inner {
    cfg: Config,
    fanout: FanOut,
    registry: HandlerRegistry,
    queue: CmdQueueManager,
    cmds_tx: mpsc::Sender<Command>,
    sources: StdMutex<Option<Sources>>,
    runners: RwLock<HashMap<String, RunnerHandle>>,
    slots: Arc<Semaphore>,
    root: CancellationToken,
}

/// The node agent's in-process scheduler and supervisor.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<Inner>,
}

impl ProcessManager {
    /// Creates a manager; call [`run`](Self::run) to start scheduling.
    pub fn new(cfg: Config) -> Self {
        let (cmds_tx, direct) = mpsc::channel(cfg.submit_capacity);
        let (queue, queued) = CmdQueueManager::new();
        let mid = Arc::new(MessageIdAllocator::load(&cfg.mid_file));

        info!(max_jobs = cfg.max_jobs, "process manager initialized");
        Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(cfg.max_jobs)),
                fanout: FanOut::new(mid),
                registry: HandlerRegistry::new(),
                queue,
                cmds_tx,
                sources: StdMutex::new(Some(Sources { direct, queued })),
                runners: RwLock::new(HashMap::new()),
                root: CancellationToken::new(),
                cfg,
            }),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// Registers a handler factory under a command name.
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn Factory>) {
        self.inner.registry.register(name, factory);
    }

    /// Appends a message handler (initialization time only).
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.inner.fanout.add_message_handler(handler);
    }

    /// Appends a result handler (initialization time only).
    pub fn add_result_handler(&self, handler: Arc<dyn ResultHandler>) {
        self.inner.fanout.add_result_handler(handler);
    }

    /// Appends a stats flush handler (initialization time only).
    pub fn add_stats_flush_handler(&self, handler: Arc<dyn StatsFlushHandler>) {
        self.inner.fanout.add_stats_flush_handler(handler);
    }

    /// Starts the reaper and the schedule loop.
    pub fn run(&self) -> Result<(), PmError> {
        let sources = self
            .inner
            .sources
            .lock()
            .expect("sources poisoned")
            .take()
            .ok_or(PmError::AlreadyRunning)?;

        Reaper::spawn(self.inner.root.child_token());
        let pm = self.clone();
        tokio::spawn(async move { pm.schedule(sources).await });
        Ok(())
    }

    /// Runs until the process receives a termination signal, then drains.
    pub async fn run_until_signal(&self) -> Result<(), PmError> {
        self.run()?;
        if let Err(err) = shutdown::wait_for_shutdown_signal().await {
            error!(%err, "signal listener failed, shutting down");
        }
        self.shutdown().await
    }

    /// Stops scheduling, kills all runners and waits up to the configured
    /// grace for them to drain.
    pub async fn shutdown(&self) -> Result<(), PmError> {
        self.inner.root.cancel();
        self.kill_all().await;

        let deadline = tokio::time::Instant::now() + self.inner.cfg.grace;
        loop {
            if self.inner.runners.read().await.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                let stuck: Vec<String> =
                    self.inner.runners.read().await.keys().cloned().collect();
                return Err(PmError::GraceExceeded {
                    grace: self.inner.cfg.grace,
                    stuck,
                });
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    /// Submits a command on the direct channel.
    ///
    /// Backpressure: waits while the scheduler is saturated.
    pub async fn push_cmd(&self, cmd: Command) -> Result<(), PmError> {
        self.inner
            .cmds_tx
            .send(cmd)
            .await
            .map_err(|_| PmError::Closed)
    }

    /// Routes a command through its named queue.
    ///
    /// Returns `false` when the command carries no queue name; use
    /// [`push_cmd`](Self::push_cmd) for those.
    pub fn push_cmd_to_queue(&self, cmd: Command) -> bool {
        self.inner.queue.push(cmd)
    }

    /// Admits a command immediately (waits for a free slot), outside the
    /// submission channels. Used for slice startup and history replay.
    pub async fn run_cmd(&self, cmd: Command) {
        self.run_cmd_with_hooks(cmd, false, Vec::new()).await;
    }

    pub(crate) async fn run_cmd_with_hooks(
        &self,
        cmd: Command,
        hooks_on_exit: bool,
        hooks: Vec<ExitHook>,
    ) {
        let Ok(permit) = self.inner.slots.clone().acquire_owned().await else {
            return;
        };
        self.admit(cmd, permit, hooks_on_exit, hooks).await;
    }

    /// Kills the runner with the given command id; true if one was live.
    pub async fn kill(&self, id: &str) -> bool {
        match self.inner.runners.read().await.get(id) {
            Some(handle) => {
                handle.kill.cancel();
                true
            }
            None => false,
        }
    }

    /// Kills every live runner.
    pub async fn kill_all(&self) {
        for handle in self.inner.runners.read().await.values() {
            handle.kill.cancel();
        }
    }

    /// Snapshot of the live commands.
    pub async fn runners(&self) -> Vec<Command> {
        self.inner
            .runners
            .read()
            .await
            .values()
            .map(|h| h.cmd.clone())
            .collect()
    }

    /// Runs a startup slice honoring `after` dependencies.
    ///
    /// Entries start as soon as all their prerequisites are released with
    /// success; an entry whose prerequisite failed is not started and gets
    /// a synthetic ERROR result naming the failed keys. Keys needed but not
    /// provided by the slice are assumed satisfied. Returns once every key
    /// of the slice is released.
    pub async fn run_slice(&self, slice: Vec<StartupEntry>) {
        let state = Arc::new(StateMachine::new());
        let mut provided: HashSet<String> = HashSet::new();
        let mut needed: HashSet<String> = HashSet::new();
        let mut all: Vec<String> = Vec::new();
        let mut waiters = JoinSet::new();

        for entry in slice {
            let key = entry.key().to_string();
            let mut cmd = Command::new(key.clone(), entry.name.clone())
                .with_data(entry.data.clone())
                .with_args(entry.args.clone());
            cmd.gid = self.inner.cfg.gid;
            cmd.nid = self.inner.cfg.nid;

            provided.insert(key.clone());
            all.push(key.clone());
            needed.extend(entry.after.iter().cloned());

            let pm = self.clone();
            let state = state.clone();
            waiters.spawn(async move {
                debug!(cmd = %cmd, after = ?entry.after, "waiting for dependencies");
                let can_run = state.wait(&entry.after).await;

                if can_run {
                    info!(cmd = %cmd, "starting slice entry");
                    let released = state.clone();
                    let release_key = key.clone();
                    let hook: ExitHook =
                        Arc::new(move |success| released.release(release_key.clone(), success));
                    pm.run_cmd_with_hooks(cmd, entry.must_exit, vec![hook]).await;
                } else {
                    let failed = state.failed(&entry.after);
                    warn!(cmd = %cmd, ?failed, "dependencies failed, not starting");
                    let result = JobResult::new(&cmd, JobState::Error)
                        .with_data(format!("dependency failed: {}", failed.join(", ")));
                    pm.inner.fanout.result(&cmd, result).await;
                    state.release(key, false);
                }
            });
        }

        // Dependencies external to the slice are assumed satisfied.
        for key in needed.difference(&provided) {
            debug!(key = %key, "auto-releasing external dependency");
            state.release(key.clone(), true);
        }

        state.wait(&all).await;
        while waiters.join_next().await.is_some() {}
    }

    /// Consumes both command sources under the slot gate, forever.
    async fn schedule(&self, mut sources: Sources) {
        loop {
            let permit = tokio::select! {
                _ = self.inner.root.cancelled() => break,
                permit = self.inner.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let cmd = tokio::select! {
                _ = self.inner.root.cancelled() => break,
                maybe = sources.direct.recv() => match maybe {
                    Some(cmd) => cmd,
                    None => break,
                },
                maybe = sources.queued.recv() => match maybe {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            self.admit(cmd, permit, false, Vec::new()).await;
        }
        debug!("schedule loop stopped");
    }

    /// Builds and starts a runner for `cmd`, or synthesizes the admission
    /// failure result. The slot travels into the runner task and frees on
    /// its terminal cleanup.
    async fn admit(
        &self,
        cmd: Command,
        permit: OwnedSemaphorePermit,
        hooks_on_exit: bool,
        hooks: Vec<ExitHook>,
    ) -> bool {
        let Some(factory) = self.inner.registry.get(&cmd.name) else {
            warn!(cmd = %cmd, "unknown command");
            let result = JobResult::new(&cmd, JobState::UnknownCmd)
                .with_data(format!("unknown command '{}'", cmd.name));
            self.reject(cmd, result, permit, &hooks).await;
            return false;
        };

        let process = match factory.build(&cmd) {
            Ok(process) => process,
            Err(err) => {
                warn!(cmd = %cmd, err = err.as_label(), "factory failed");
                let result = JobResult::new(&cmd, JobState::Error).with_data(err.to_string());
                self.reject(cmd, result, permit, &hooks).await;
                return false;
            }
        };

        let kill = CancellationToken::new();
        {
            let mut runners = self.inner.runners.write().await;
            if runners.contains_key(&cmd.id) {
                drop(runners);
                warn!(cmd = %cmd, "duplicate job id");
                let result = JobResult::new(&cmd, JobState::DuplicateId)
                    .with_data(format!("duplicate job id '{}'", cmd.id));
                self.reject(cmd, result, permit, &hooks).await;
                return false;
            }
            runners.insert(
                cmd.id.clone(),
                RunnerHandle {
                    cmd: cmd.clone(),
                    kill: kill.clone(),
                },
            );
        }

        let runner = Runner::new(self.clone(), cmd, kill, hooks_on_exit, hooks);
        tokio::spawn(async move {
            let _slot = permit;
            runner.run(process).await;
        });
        true
    }

    /// Synthesizes an admission-failure result: the result fan-out fires,
    /// hooks learn the failure, the queue advances, the slot frees.
    async fn reject(
        &self,
        cmd: Command,
        result: JobResult,
        permit: OwnedSemaphorePermit,
        hooks: &[ExitHook],
    ) {
        self.inner.fanout.result(&cmd, result).await;
        for hook in hooks {
            hook(false);
        }
        self.inner.queue.notify(&cmd);
        drop(permit);
    }

    /// Terminal cleanup, invoked by runners: the live entry is removed
    /// before the queue releases a successor.
    pub(crate) async fn cleanup(&self, cmd: &Command) {
        self.inner.runners.write().await.remove(&cmd.id);
        self.inner.queue.notify(cmd);
    }

    pub(crate) async fn message(&self, cmd: &Command, msg: Message) {
        self.inner.fanout.message(cmd, msg).await;
    }

    pub(crate) async fn result(&self, cmd: &Command, result: JobResult) {
        self.inner.fanout.result(cmd, result).await;
    }

    pub(crate) async fn stats(&self, stats: &Stats) {
        self.inner.fanout.stats(stats).await;
    }
}
