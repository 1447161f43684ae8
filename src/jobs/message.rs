//! # Log messages and the child line protocol.
//!
//! Child processes talk back over stdout/stderr with line-delimited text.
//! A line may carry a level marker:
//!
//! ```text
//! 20::{"free": 1024}     level 20 (result JSON)
//! 2::disk is full        level 2
//! plain text             level 1 (no marker)
//! ```
//!
//! [`Message::parse`] implements that protocol. `epoch` and `id` are left
//! zero here; the fan-out stamps them right before dispatch so ids are
//! allocated in delivery order.

use serde::{Deserialize, Serialize};

/// Well-known message and result encoding levels.
pub mod levels {
    /// Plain informational output (unmarked stdout lines).
    pub const STDOUT: u8 = 1;
    /// Error output.
    pub const STDERR: u8 = 2;
    /// JSON-encoded result payload.
    pub const RESULT_JSON: u8 = 20;
}

/// One structured log line captured from a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Id of the command that produced this message.
    pub cmd_id: String,
    /// Protocol level of the line.
    pub level: u8,
    /// Message body with the level marker stripped.
    pub message: String,
    /// Nanoseconds since the epoch, stamped at fan-out.
    #[serde(default)]
    pub epoch: i64,
    /// Monotonic id, assigned at fan-out (persisted across restarts).
    #[serde(default)]
    pub id: u32,
}

impl Message {
    /// Creates a message at an explicit level.
    pub fn new(cmd_id: impl Into<String>, level: u8, message: impl Into<String>) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            level,
            message: message.into(),
            epoch: 0,
            id: 0,
        }
    }

    /// Parses one output line against the `N::` level protocol.
    ///
    /// Unmarked lines (including malformed markers) come out at
    /// [`levels::STDOUT`] with the full line as body.
    pub fn parse(cmd_id: &str, line: &str) -> Self {
        if let Some((marker, body)) = line.split_once("::") {
            if !marker.is_empty() && marker.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(level) = marker.parse::<u8>() {
                    return Self::new(cmd_id, level, body);
                }
            }
        }
        Self::new(cmd_id, levels::STDOUT, line)
    }
}
