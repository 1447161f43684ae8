//! # The unit of submission.
//!
//! A [`Command`] names a registered handler, carries an opaque payload and a
//! typed argument bag, and is identified by a caller-supplied `id` that must
//! be unique among live runners. Commands arrive as JSON from controllers
//! and are echoed (tags and args) onto the matching [`JobResult`](crate::JobResult).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::jobs::args::Args;

/// A job description submitted to the process manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Command {
    /// Caller-supplied identifier, unique among live runners.
    #[serde(default)]
    pub id: String,
    /// Grid id of the node this command targets.
    #[serde(default)]
    pub gid: u32,
    /// Node id within the grid.
    #[serde(default)]
    pub nid: u32,
    /// Handler name; resolved through the registry.
    #[serde(default)]
    pub name: String,
    /// Opaque payload handed to the handler (piped to an external child's stdin).
    #[serde(default)]
    pub data: String,
    /// Typed key-value bag, copied onto the result.
    #[serde(default)]
    pub args: Args,
    /// Opaque routing hint, copied onto the result.
    #[serde(default)]
    pub tags: String,
}

impl Command {
    /// Creates a command with the given id and handler name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Replaces the payload.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Replaces the argument bag.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Replaces the routing tags.
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Parses a command from its controller wire form.
    pub fn load(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
