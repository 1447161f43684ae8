//! # Monotonic message-id allocator.
//!
//! Message ids must keep increasing across agent restarts, so every
//! increment is written back to a small text file holding the decimal
//! counter. A missing or malformed file starts the counter at 0. If the
//! write fails the allocator logs and keeps counting in memory; a restart
//! may then reuse ids, which downstream consumers tolerate.
//!
//! The counter is a `u32` for wire compatibility and wraps silently via
//! `wrapping_add` after 2^32 - 1 ids.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::error;

/// Persisted monotonic counter for message ids.
pub struct MessageIdAllocator {
    file: PathBuf,
    state: Mutex<u32>,
}

impl MessageIdAllocator {
    /// Loads the counter from `file`, starting at 0 when absent or unreadable.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let value = match fs::read_to_string(&file) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(v) => v,
                Err(err) => {
                    error!(file = %file.display(), %err, "malformed message-id file, restarting at 0");
                    0
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => {
                error!(file = %file.display(), %err, "cannot read message-id file, restarting at 0");
                0
            }
        };
        Self {
            file,
            state: Mutex::new(value),
        }
    }

    /// Allocates the next id and persists the counter.
    pub fn next(&self) -> u32 {
        let mut state = self.state.lock().expect("message-id state poisoned");
        *state = state.wrapping_add(1);
        self.persist(*state);
        *state
    }

    /// Current counter value (the last id handed out).
    pub fn current(&self) -> u32 {
        *self.state.lock().expect("message-id state poisoned")
    }

    fn persist(&self, value: u32) {
        if let Err(err) = write_counter(&self.file, value) {
            error!(file = %self.file.display(), %err, "cannot persist message-id, continuing in memory");
        }
    }
}

#[cfg(unix)]
fn write_counter(file: &std::path::Path, value: u32) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(file)?;
    f.write_all(value.to_string().as_bytes())
}

#[cfg(not(unix))]
fn write_counter(file: &std::path::Path, value: u32) -> std::io::Result<()> {
    fs::write(file, value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_zero_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid");

        let alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "2");
    }

    #[test]
    fn survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid");

        let first = MessageIdAllocator::load(&path);
        for _ in 0..5 {
            first.next();
        }
        drop(first);

        let second = MessageIdAllocator::load(&path);
        assert_eq!(second.current(), 5);
        assert_eq!(second.next(), 6);
    }

    #[test]
    fn malformed_file_restarts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid");
        fs::write(&path, "not a number").unwrap();

        let alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), 1);
    }

    #[test]
    fn wraps_silently_at_u32_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid");
        fs::write(&path, u32::MAX.to_string()).unwrap();

        let alloc = MessageIdAllocator::load(&path);
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.next(), 1);
    }
}
