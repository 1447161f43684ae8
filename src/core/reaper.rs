//! # SIGCHLD reaper.
//!
//! One logical loop subscribes to child-terminated signals, drains ready
//! exits with a non-blocking `waitpid`, and routes each wait-status to the
//! channel registered for that PID.
//!
//! ## Rules
//! - Registration is atomic with process start: the PID map lock is held
//!   across the spawn and the channel insertion, so a SIGCHLD arriving
//!   immediately after `fork`/`exec` cannot observe an unregistered PID.
//! - Every registered PID receives exactly one wait-status, after which its
//!   channel is closed and the mapping removed.
//! - A reaped PID with no registered channel is logged and discarded; it
//!   means a child was started outside the registry.
//!
//! `waitpid(-1)` reaps *any* child of the process, so the PID→channel map
//! is process-wide: several manager instances in one process (tests, mostly)
//! share it, and whichever reaper loop drains an exit routes it correctly.

use std::collections::HashMap;
use std::io;
use std::process::{Child, Command as OsCommand};
use std::sync::{Mutex, OnceLock};

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Process-wide PID → wait-status channel map.
fn pid_map() -> &'static Mutex<HashMap<i32, oneshot::Sender<WaitStatus>>> {
    static PIDS: OnceLock<Mutex<HashMap<i32, oneshot::Sender<WaitStatus>>>> = OnceLock::new();
    PIDS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Signal-driven child reaper.
pub struct Reaper;

impl Reaper {
    /// Spawns a child and registers its PID for wait-status delivery.
    ///
    /// The map lock is held across the spawn, closing the race between a
    /// fast-exiting child and the registration of its channel.
    pub fn register_spawn(
        cmd: &mut OsCommand,
    ) -> io::Result<(Child, oneshot::Receiver<WaitStatus>)> {
        let mut pids = pid_map().lock().expect("pid map poisoned");
        let child = cmd.spawn()?;
        let pid = child.id() as i32;
        let (tx, rx) = oneshot::channel();
        pids.insert(pid, tx);
        trace!(pid, "child registered with reaper");
        Ok((child, rx))
    }

    /// Starts the reap loop; it runs until `token` is cancelled.
    pub fn spawn(token: CancellationToken) {
        tokio::spawn(async move {
            let mut sigchld = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::child(),
            ) {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, "cannot subscribe to SIGCHLD, reaper disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = sigchld.recv() => {
                        if received.is_none() {
                            break;
                        }
                        Self::drain();
                    }
                }
            }
        });
    }

    /// Reaps every child that already exited; signals coalesce, so one
    /// SIGCHLD may stand for several exits.
    fn drain() {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    let Some(pid) = status.pid() else {
                        continue;
                    };
                    Self::route(pid.as_raw(), status);
                }
                Err(nix::errno::Errno::ECHILD) => break,
                Err(err) => {
                    error!(%err, "waitpid failed");
                    break;
                }
            }
        }
    }

    fn route(pid: i32, status: WaitStatus) {
        let sender = pid_map().lock().expect("pid map poisoned").remove(&pid);
        match sender {
            Some(tx) => {
                debug!(pid, ?status, "wait-status delivered");
                let _ = tx.send(status);
            }
            None => {
                warn!(pid, "reaped a PID with no registered channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_children_receive_their_wait_status() {
        let token = CancellationToken::new();
        Reaper::spawn(token.clone());

        let (_child, rx) = Reaper::register_spawn(&mut OsCommand::new("true")).unwrap();
        let status = rx.await.unwrap();
        assert!(matches!(status, WaitStatus::Exited(_, 0)));

        token.cancel();
    }

    #[tokio::test]
    async fn exit_codes_are_preserved() {
        let token = CancellationToken::new();
        Reaper::spawn(token.clone());

        let (_child, rx) =
            Reaper::register_spawn(OsCommand::new("sh").args(["-c", "exit 3"])).unwrap();
        let status = rx.await.unwrap();
        assert!(matches!(status, WaitStatus::Exited(_, 3)));

        token.cancel();
    }
}
