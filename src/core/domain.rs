use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompilerMode {
    #[default]
    OnDemand,
    Live,
}

impl CompilerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerMode::OnDemand => "on_demand",
            CompilerMode::Live => "live",
        }
    }
}

impl fmt::Display for CompilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown compiler mode: {name:?}")]
pub struct UnknownModeError {
    pub name: String,
}

impl FromStr for CompilerMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "on_demand" | "ondemand" => Ok(CompilerMode::OnDemand),
            "live" => Ok(CompilerMode::Live),
            _ => Err(UnknownModeError {
                name: s.to_string(),
            }),
        }
    }
}

/// Identifies one launch of the compiler executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of the compiler process currently owned by a strategy.
#[derive(Clone, Debug)]
pub struct CompilationJob {
    pub id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Directory the process runs in. Relative diagnostic paths resolve against it.
    pub cwd: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl CompilationJob {
    pub fn new(input: PathBuf, output: PathBuf, cwd: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            input,
            output,
            cwd,
            stdout: String::new(),
            stderr: String::new(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_milliseconds()
    }

    /// Parses compiler errors in `stderr` of this job.
    pub fn parse_diagnostics(&self, stderr: &str) -> ErrorReport {
        crate::core::diagnostics::parse(stderr, &self.cwd)
    }
}

/// One error reported by the compiler.
///
/// `line` is 1-based, `column` is 0-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub underline_length: usize,
}

/// Diagnostics of a failed compilation grouped by absolute file path.
///
/// Files keep the order in which they first appeared in the compiler output,
/// and so do the diagnostics of each file. A report names a handful of files,
/// so they are kept in a `Vec` and looked up linearly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorReport {
    files: Vec<(PathBuf, Vec<DiagnosticEntry>)>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf, entry: DiagnosticEntry) {
        match self.files.iter_mut().find(|(p, _)| *p == path) {
            Some((_, entries)) => entries.push(entry),
            None => self.files.push((path, vec![entry])),
        }
    }

    pub fn get(&self, path: &Path) -> Option<&[DiagnosticEntry]> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[DiagnosticEntry])> {
        self.files
            .iter()
            .map(|(path, entries)| (path.as_path(), entries.as_slice()))
    }

    /// Number of files with at least one diagnostic.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.files.iter().map(|(_, entries)| entries.len()).sum()
    }
}

/// Everything a compiler strategy reports to the rest of the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompilerEvent {
    Started,
    Stopped,
    CompilationStarted,
    CompilationFinished,
    DocumentChanged,
    ErrorReport(ErrorReport),
    NewStdout(String),
    NewStderr(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompilerCommand {
    SetInputPath(PathBuf),
    SetOutputPath(PathBuf),
    Start,
    Stop,
    SourceChanged,
    SwitchMode(CompilerMode),
    Restart,
    Shutdown,
}
