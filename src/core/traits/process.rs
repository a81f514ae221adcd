use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::domain::JobId;

/// A fully resolved compiler launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().and_then(|arg| arg.to_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (in {})",
            self.program,
            self.args.iter().map(|arg| arg.to_string_lossy()).join(" "),
            self.cwd.display()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessEvent {
    pub job: JobId,
    pub kind: ProcessEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEventKind {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Always the last event of a job. Processes killed by a signal report -1.
    Exited(i32),
}

pub type ProcessEventSender = UnboundedSender<ProcessEvent>;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running child process.
#[mockall::automock]
pub trait ProcessHandle: std::fmt::Debug + Send {
    fn pid(&self) -> Option<u32>;

    /// Requests termination without waiting for the process to exit.
    fn terminate(&mut self);
}

/// Launches child processes and reports their output and exit as [`ProcessEvent`]s.
///
/// Implementations must return without waiting for the process, deliver all
/// stdout/stderr chunks of a job before its `Exited` event, and tag every
/// event with the `job` they were given.
#[mockall::automock]
pub trait ProcessSpawner: std::fmt::Debug + Send + Sync {
    fn spawn(
        &self,
        job: JobId,
        invocation: &Invocation,
        events: ProcessEventSender,
    ) -> Result<Box<dyn ProcessHandle>, SpawnError>;
}
