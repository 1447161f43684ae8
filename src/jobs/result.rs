//! # Job results.
//!
//! Every command accepted by the manager produces exactly one [`JobResult`].
//! Admission failures (unknown name, duplicate id) are synthesized into
//! results as well, so a submitter never has to distinguish "rejected" from
//! "ran and failed": everything arrives on the result fan-out.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::jobs::{args::Args, command::Command};

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Exit code 0 (or the internal handler reported success).
    #[serde(rename = "SUCCESS")]
    Success,
    /// Runtime failure; `data` carries the error description.
    #[serde(rename = "ERROR")]
    Error,
    /// Terminated via the kill path (operator kill or grace-period escalation).
    #[serde(rename = "KILLED")]
    Killed,
    /// Wall clock exceeded `max_time`.
    #[serde(rename = "TIMEOUT")]
    Timeout,
    /// Command name not present in the handler registry.
    #[serde(rename = "UNKNOWN_CMD")]
    UnknownCmd,
    /// A live runner already carries this command id.
    #[serde(rename = "DUPLICATE_ID")]
    DuplicateId,
}

impl JobState {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Success => "success",
            JobState::Error => "error",
            JobState::Killed => "killed",
            JobState::Timeout => "timeout",
            JobState::UnknownCmd => "unknown_cmd",
            JobState::DuplicateId => "duplicate_id",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// The single result record delivered for a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Id of the command this result belongs to.
    pub cmd_id: String,
    /// Grid id, copied from the command.
    pub gid: u32,
    /// Node id, copied from the command.
    pub nid: u32,
    /// Terminal state.
    pub state: JobState,
    /// Opaque payload; `level` selects its encoding.
    #[serde(default)]
    pub data: String,
    /// Encoding level of `data` (see [`crate::jobs::message::levels`]).
    #[serde(default)]
    pub level: u8,
    /// Start of execution, milliseconds since the epoch.
    #[serde(default)]
    pub start_time: i64,
    /// Execution duration in milliseconds.
    #[serde(default)]
    pub time: i64,
    /// Routing hint copied from the command at fan-out.
    #[serde(default)]
    pub tags: String,
    /// Argument bag copied from the command at fan-out.
    #[serde(default)]
    pub args: Args,
}

impl JobResult {
    /// Creates a result for `cmd` in the given state.
    ///
    /// `tags` and `args` are stamped again at fan-out, so a handler does not
    /// have to be careful about preserving them.
    pub fn new(cmd: &Command, state: JobState) -> Self {
        Self {
            cmd_id: cmd.id.clone(),
            gid: cmd.gid,
            nid: cmd.nid,
            state,
            data: String::new(),
            level: 0,
            start_time: 0,
            time: 0,
            tags: cmd.tags.clone(),
            args: cmd.args.clone(),
        }
    }

    /// Attaches a payload.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Attaches the payload encoding level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Stamps `start_time` (epoch ms) and `time` (duration ms).
    pub fn with_timing(mut self, started: SystemTime) -> Self {
        let start_ms = started
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let dur_ms = SystemTime::now()
            .duration_since(started)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        self.start_time = start_ms;
        self.time = dur_ms;
        self
    }
}
