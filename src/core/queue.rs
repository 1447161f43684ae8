//! # Named command queues.
//!
//! The queue manager serializes commands that share a queue name: for any
//! name, at most one command is released to the scheduler at a time, and
//! release order is submission order. Commands without a queue name never
//! enter the manager; they go through the direct channel.
//!
//! ```text
//!  push("q", c1) ──► [c1]        ──release──► producer ──► scheduler
//!  push("q", c2) ──► [c1, c2]                  (c1 runs)
//!  notify(c1)    ──► [c2]        ──release──► producer ──► scheduler
//! ```
//!
//! The head of a queue stays in place while its command runs; that is what
//! marks the queue busy. [`CmdQueueManager::notify`] pops it on terminal
//! transition and releases the next head, which gives the per-queue
//! completion-before-start ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::jobs::Command;

/// Per-name FIFO releasing one command at a time.
pub struct CmdQueueManager {
    queues: Mutex<HashMap<String, VecDeque<Command>>>,
    producer: mpsc::UnboundedSender<Command>,
}

impl CmdQueueManager {
    /// Creates the manager and the producer endpoint the scheduler consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                queues: Mutex::new(HashMap::new()),
                producer: tx,
            },
            rx,
        )
    }

    /// Enqueues a command on its named queue.
    ///
    /// Returns `false` (without enqueueing) when the command carries no
    /// queue name; such commands belong on the direct channel.
    pub fn push(&self, cmd: Command) -> bool {
        let name = cmd.args.queue().to_string();
        if name.is_empty() {
            warn!(cmd = %cmd, "command has no queue name, refusing to enqueue");
            return false;
        }

        let mut queues = self.queues.lock().expect("queue map poisoned");
        let queue = queues.entry(name.clone()).or_default();
        queue.push_back(cmd);
        if queue.len() == 1 {
            // Queue was idle: release the head immediately.
            let head = queue.front().cloned();
            drop(queues);
            if let Some(head) = head {
                debug!(queue = %name, cmd = %head, "releasing head of idle queue");
                let _ = self.producer.send(head);
            }
        }
        true
    }

    /// Called on a runner's terminal transition; releases the next command
    /// of the queue, if any.
    pub fn notify(&self, cmd: &Command) {
        let name = cmd.args.queue();
        if name.is_empty() {
            return;
        }

        let mut queues = self.queues.lock().expect("queue map poisoned");
        let Some(queue) = queues.get_mut(name) else {
            return;
        };
        queue.pop_front();
        match queue.front().cloned() {
            Some(next) => {
                debug!(queue = %name, cmd = %next, "releasing next queued command");
                let _ = self.producer.send(next);
            }
            None => {
                queues.remove(name);
            }
        }
    }

    /// Number of commands currently held (including running heads).
    pub fn pending(&self) -> usize {
        self.queues
            .lock()
            .expect("queue map poisoned")
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Args;

    fn queued(id: &str, queue: &str) -> Command {
        Command::new(id, "x").with_args(Args::new().with("queue", queue))
    }

    #[tokio::test]
    async fn first_push_releases_immediately() {
        let (mgr, mut rx) = CmdQueueManager::new();
        assert!(mgr.push(queued("a", "q")));
        assert_eq!(rx.recv().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn later_pushes_wait_for_notify() {
        let (mgr, mut rx) = CmdQueueManager::new();
        mgr.push(queued("a", "q"));
        mgr.push(queued("b", "q"));
        mgr.push(queued("c", "q"));

        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert!(rx.try_recv().is_err(), "b released before a finished");

        mgr.notify(&queued("a", "q"));
        assert_eq!(rx.recv().await.unwrap().id, "b");
        mgr.notify(&queued("b", "q"));
        assert_eq!(rx.recv().await.unwrap().id, "c");
        mgr.notify(&queued("c", "q"));
        assert_eq!(mgr.pending(), 0);
    }

    #[tokio::test]
    async fn distinct_queues_release_independently() {
        let (mgr, mut rx) = CmdQueueManager::new();
        mgr.push(queued("a", "q1"));
        mgr.push(queued("b", "q2"));

        let mut released = vec![rx.recv().await.unwrap().id, rx.recv().await.unwrap().id];
        released.sort();
        assert_eq!(released, vec!["a", "b"]);
    }

    #[test]
    fn unnamed_commands_are_refused() {
        let (mgr, _rx) = CmdQueueManager::new();
        assert!(!mgr.push(Command::new("a", "x")));
        assert_eq!(mgr.pending(), 0);
    }

    #[test]
    fn notify_for_unknown_queue_is_a_no_op() {
        let (mgr, _rx) = CmdQueueManager::new();
        mgr.notify(&queued("ghost", "never-seen"));
    }
}
