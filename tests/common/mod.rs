#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobvisor::{
    Args, Command, Config, InternalFn, JobResult, JobState, ProcessManager, ResultFn,
    ResultHandler,
};

/// Opt-in test logging: `RUST_LOG=jobvisor=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Manager with an isolated message-id file; keep the tempdir alive.
pub fn test_pm(max_jobs: usize) -> (ProcessManager, tempfile::TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        max_jobs,
        mid_file: dir.path().join("mid"),
        ..Config::default()
    };
    (ProcessManager::new(cfg), dir)
}

/// Registers `sleep`: an internal handler sleeping `args.ms` milliseconds,
/// exiting early (still successfully) when cancelled.
pub fn register_sleep(pm: &ProcessManager) {
    pm.register(
        "sleep",
        InternalFn::arc(|cmd, ctx| async move {
            let ms = cmd.args.get_int("ms").unwrap_or(0).max(0) as u64;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = ctx.cancelled() => {}
            }
            JobResult::new(&cmd, JobState::Success)
        }),
    );
}

/// A sleep command with the given id and duration.
pub fn sleep_cmd(id: &str, ms: i64) -> Command {
    Command::new(id, "sleep").with_args(Args::new().with("ms", ms))
}

/// Collects results delivered through the fan-out.
#[derive(Clone, Default)]
pub struct Results {
    inner: Arc<Mutex<Vec<JobResult>>>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler to register on the manager.
    pub fn handler(&self) -> Arc<dyn ResultHandler> {
        let inner = self.inner.clone();
        ResultFn::arc(move |_cmd, result| {
            let inner = inner.clone();
            async move {
                inner.lock().unwrap().push(result);
            }
        })
    }

    pub fn all(&self) -> Vec<JobResult> {
        self.inner.lock().unwrap().clone()
    }

    /// Waits until `n` results arrived or the timeout elapses.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<JobResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let results = self.all();
            if results.len() >= n {
                return results;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} results, got {}",
                results.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// The result for one command id.
    pub fn for_cmd(&self, id: &str) -> Option<JobResult> {
        self.all().into_iter().find(|r| r.cmd_id == id)
    }
}
