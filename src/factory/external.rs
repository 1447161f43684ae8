//! # External process factory.
//!
//! [`ExternalFactory`] is configured once (binary, argv template, cwd, env,
//! typically from the agent's `[cmds]` settings table) and stamps out an
//! [`ExternalProcess`] per command. Argv templates may reference values from
//! the command's argument bag with `{key}` placeholders; the command's
//! `data` payload is piped to the child's stdin.
//!
//! The factory never spawns. Spawning happens inside the runner, under the
//! reaper's registration lock, so SIGCHLD cannot outrun PID registration.

use std::path::PathBuf;
use std::process::{Command as OsCommand, Stdio};
use std::sync::Arc;

use crate::{
    error::FactoryError,
    factory::{Factory, JobProcess},
    jobs::{Args, Command},
};

/// Factory for commands that run as a child binary.
#[derive(Debug, Clone)]
pub struct ExternalFactory {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ExternalFactory {
    /// Creates a factory for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Sets the argv template (`{key}` placeholders are substituted per command).
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory of spawned children.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable for spawned children.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Wraps the factory for registration.
    pub fn arc(self) -> Arc<dyn Factory> {
        Arc::new(self)
    }
}

impl Factory for ExternalFactory {
    fn build(&self, cmd: &Command) -> Result<JobProcess, FactoryError> {
        if self.program.is_empty() {
            return Err(FactoryError::InvalidSpec("empty program".into()));
        }
        Ok(JobProcess::External(ExternalProcess {
            program: self.program.clone(),
            args: self.args.iter().map(|a| substitute(a, &cmd.args)).collect(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            stdin_data: cmd.data.clone(),
        }))
    }
}

/// A fully resolved child process description, ready to spawn.
#[derive(Debug)]
pub struct ExternalProcess {
    /// Binary to execute.
    pub program: String,
    /// Resolved argv (placeholders substituted).
    pub args: Vec<String>,
    /// Working directory, if configured.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Payload written to the child's stdin (empty = stdin closed).
    pub stdin_data: String,
}

impl ExternalProcess {
    /// Builds the OS command with captured stdio.
    pub(crate) fn command(&self) -> OsCommand {
        let mut cmd = OsCommand::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin_data.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            });
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

/// Replaces `{key}` placeholders with string or integer values from the bag.
/// Placeholders without a value are left untouched.
fn substitute(template: &str, args: &Args) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find('}') {
            Some(close) => {
                let key = &tail[1..close];
                if let Some(v) = args.get_str(key) {
                    out.push_str(v);
                } else if let Some(v) = args.get_int(key) {
                    out.push_str(&v.to_string());
                } else {
                    out.push_str(&tail[..=close]);
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
