//! # Replay log for long-running jobs.
//!
//! Commands submitted with `max_time == -1` are expected to outlive agent
//! restarts, so they are appended to a history file (a JSON array of
//! commands) and resubmitted on the next startup. This is the whole
//! persistence story for jobs; there is deliberately no durable queue.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::{core::ProcessManager, jobs::Command};

/// JSON-array replay log of indefinitely running commands.
pub struct History {
    path: PathBuf,
    entries: Mutex<Vec<Command>>,
}

impl History {
    /// Loads the log, starting empty when the file is absent or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Command>>(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(file = %path.display(), %err, "malformed history file, starting empty");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(file = %path.display(), %err, "cannot read history file, starting empty");
                Vec::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Records a command if it is marked indefinite (`max_time == -1`);
    /// returns whether it was recorded.
    pub fn record(&self, cmd: &Command) -> bool {
        if cmd.args.max_time() != -1 {
            return false;
        }
        let mut entries = self.entries.lock().expect("history entries poisoned");
        entries.push(cmd.clone());
        self.save(&entries);
        true
    }

    /// Current log contents.
    pub fn commands(&self) -> Vec<Command> {
        self.entries.lock().expect("history entries poisoned").clone()
    }

    /// Resubmits every recorded command to the manager.
    pub async fn replay(&self, pm: &ProcessManager) {
        for cmd in self.commands() {
            info!(cmd = %cmd, "replaying job from history");
            pm.run_cmd(cmd).await;
        }
    }

    fn save(&self, entries: &[Command]) {
        let payload = match serde_json::to_vec(entries) {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, "cannot encode history");
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, payload) {
            error!(file = %self.path.display(), %err, "cannot persist history");
        }
    }
}
