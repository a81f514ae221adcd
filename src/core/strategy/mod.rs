//! Compiler strategies: the mode specific policies behind [`CompilerStrategy`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{
    domain::{CompilationJob, CompilerEvent, CompilerMode, JobId},
    traits::{
        process::{
            Invocation, ProcessEvent, ProcessEventKind, ProcessEventSender, ProcessHandle,
            ProcessSpawner,
        },
        strategy::{CompilerStrategy, EventEmitter},
    },
};

pub mod dummy;
pub mod live;
pub mod on_demand;

use dummy::DummyStrategy;
use live::LiveStrategy;
use on_demand::OnDemandStrategy;

/// Everything a strategy needs from the application.
#[derive(Clone, Debug)]
pub struct StrategyContext {
    pub compiler: String,
    pub working_directory: watch::Receiver<PathBuf>,
    pub spawner: Arc<dyn ProcessSpawner>,
    pub process_events: ProcessEventSender,
    pub emitter: EventEmitter,
}

/// Builds the strategy for `mode`, or an inert one when the mode is unknown.
pub fn create_strategy(
    mode: Option<CompilerMode>,
    context: StrategyContext,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Box<dyn CompilerStrategy> {
    let base = StrategyBase::new(context, input, output);
    match mode {
        Some(CompilerMode::OnDemand) => Box::new(OnDemandStrategy::new(base)),
        Some(CompilerMode::Live) => Box::new(LiveStrategy::new(base)),
        None => Box::new(DummyStrategy::new(base)),
    }
}

/// Decoded output of the current job.
#[derive(Debug, PartialEq, Eq)]
pub enum JobOutput {
    Stdout(String),
    Stderr(String),
    Exited(i32),
}

#[derive(Debug)]
struct ActiveJob {
    job: CompilationJob,
    handle: Box<dyn ProcessHandle>,
    stdout: Utf8Decoder,
    stderr: Utf8Decoder,
}

/// State shared by all strategies: target paths, the running job and the
/// plumbing to launch processes and emit events.
#[derive(Debug)]
pub struct StrategyBase {
    context: StrategyContext,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    active: Option<ActiveJob>,
}

impl StrategyBase {
    pub fn new(context: StrategyContext, input: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            context,
            input: input.filter(|p| !p.as_os_str().is_empty()),
            output: output.filter(|p| !p.as_os_str().is_empty()),
            active: None,
        }
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn set_input_path(&mut self, path: PathBuf) {
        if let Some(path) = self.checked_path(path, "input") {
            self.input = Some(path);
        }
    }

    pub fn set_output_path(&mut self, path: PathBuf) {
        if let Some(path) = self.checked_path(path, "output") {
            self.output = Some(path);
        }
    }

    fn checked_path(&self, path: PathBuf, which: &str) -> Option<PathBuf> {
        if path.as_os_str().is_empty() {
            tracing::warn!("Ignoring empty {} path", which);
            return None;
        }
        if self.is_running() {
            tracing::debug!(
                "New {} path {} takes effect on the next start",
                which,
                path.display()
            );
        }
        Some(path)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.active.as_ref().map(|active| active.job.id)
    }

    pub fn job(&self) -> Option<&CompilationJob> {
        self.active.as_ref().map(|active| &active.job)
    }

    pub fn working_directory(&self) -> PathBuf {
        self.context.working_directory.borrow().clone()
    }

    pub fn emit(&self, event: CompilerEvent) {
        self.context.emitter.emit(event);
    }

    /// Launches `compiler <subcommand> <input> <output>`.
    ///
    /// Emits `Started` on success. Without both paths, or when the launch
    /// fails, emits `Stopped` instead and returns `None`.
    pub fn launch(&mut self, subcommand: &str) -> Option<JobId> {
        debug_assert!(self.active.is_none(), "a compiler process is already running");

        let (Some(input), Some(output)) = (self.input.clone(), self.output.clone()) else {
            tracing::warn!(
                "Cannot start the compiler: input={:?}, output={:?}",
                self.input,
                self.output
            );
            self.emit(CompilerEvent::Stopped);
            return None;
        };

        let cwd = self.working_directory();
        let job = CompilationJob::new(input.clone(), output.clone(), cwd.clone());
        let invocation = Invocation {
            program: self.context.compiler.clone(),
            args: vec![subcommand.into(), input.into_os_string(), output.into_os_string()],
            cwd,
        };

        tracing::debug!("Launching job {}: {}", job.id, invocation);
        match self
            .context
            .spawner
            .spawn(job.id, &invocation, self.context.process_events.clone())
        {
            Ok(handle) => {
                tracing::debug!("Job {} runs as pid {:?}", job.id, handle.pid());
                let id = job.id;
                self.active = Some(ActiveJob {
                    job,
                    handle,
                    stdout: Utf8Decoder::default(),
                    stderr: Utf8Decoder::default(),
                });
                self.emit(CompilerEvent::Started);
                Some(id)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.emit(CompilerEvent::Stopped);
                None
            }
        }
    }

    /// Accepts an event of the current job: text is decoded, accumulated and
    /// emitted, an exit ends the job. Events of any other job are dropped.
    pub fn accept(&mut self, event: ProcessEvent) -> Option<JobOutput> {
        let Some(active) = self.active.as_mut().filter(|a| a.job.id == event.job) else {
            tracing::debug!("Ignoring event of detached job {}", event.job);
            return None;
        };

        match event.kind {
            ProcessEventKind::Stdout(bytes) => {
                let text = active.stdout.decode(&bytes);
                if text.is_empty() {
                    return None;
                }
                active.job.stdout.push_str(&text);
                self.emit(CompilerEvent::NewStdout(text.clone()));
                Some(JobOutput::Stdout(text))
            }
            ProcessEventKind::Stderr(bytes) => {
                let text = active.stderr.decode(&bytes);
                if text.is_empty() {
                    return None;
                }
                active.job.stderr.push_str(&text);
                self.emit(CompilerEvent::NewStderr(text.clone()));
                Some(JobOutput::Stderr(text))
            }
            ProcessEventKind::Exited(code) => Some(JobOutput::Exited(code)),
        }
    }

    /// Ends the current job after its process exited.
    pub fn finish(&mut self) -> Option<CompilationJob> {
        self.active.take().map(|mut active| {
            active.job.stdout.push_str(&active.stdout.flush());
            active.job.stderr.push_str(&active.stderr.flush());
            active.job
        })
    }

    /// Detaches from the current job and asks its process to terminate.
    /// Further events of the job are ignored.
    pub fn detach(&mut self) -> Option<CompilationJob> {
        self.active.take().map(|mut active| {
            tracing::debug!("Terminating job {}", active.job.id);
            active.handle.terminate();
            active.job
        })
    }
}

/// Incremental UTF-8 decoding of a byte stream delivered in arbitrary chunks.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An incomplete sequence at the end waits for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    fn flush(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for strategy tests.

    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    use super::*;
    use crate::core::traits::process::{MockProcessHandle, MockProcessSpawner};

    pub struct Harness {
        pub context: StrategyContext,
        pub events: UnboundedReceiver<CompilerEvent>,
        pub process_events: UnboundedReceiver<ProcessEvent>,
        pub launches: Arc<Mutex<Vec<(JobId, Invocation)>>>,
        pub terminations: Arc<Mutex<Vec<JobId>>>,
        pub working_directory: watch::Sender<PathBuf>,
    }

    impl Harness {
        pub fn new() -> Self {
            let launches = Arc::new(Mutex::new(Vec::new()));
            let terminations = Arc::new(Mutex::new(Vec::new()));
            let spawner = recording_spawner(launches.clone(), terminations.clone());
            Self::with_spawner(spawner, launches, terminations)
        }

        pub fn with_spawner(
            spawner: MockProcessSpawner,
            launches: Arc<Mutex<Vec<(JobId, Invocation)>>>,
            terminations: Arc<Mutex<Vec<JobId>>>,
        ) -> Self {
            let (working_directory, wd_rx) = watch::channel(PathBuf::from("/work"));
            let (emitter, events) = EventEmitter::channel();
            let (process_tx, process_events) = unbounded_channel();
            Self {
                context: StrategyContext {
                    compiler: "typst".to_string(),
                    working_directory: wd_rx,
                    spawner: Arc::new(spawner),
                    process_events: process_tx,
                    emitter,
                },
                events,
                process_events,
                launches,
                terminations,
                working_directory,
            }
        }

        pub fn base(&self, input: Option<&str>, output: Option<&str>) -> StrategyBase {
            StrategyBase::new(
                self.context.clone(),
                input.map(PathBuf::from),
                output.map(PathBuf::from),
            )
        }

        pub fn drain(&mut self) -> Vec<CompilerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        pub fn launch_count(&self) -> usize {
            self.launches.lock().unwrap().len()
        }

        pub fn last_launch(&self) -> (JobId, Invocation) {
            self.launches.lock().unwrap().last().cloned().expect("no launch")
        }
    }

    /// A spawner whose processes never report anything on their own.
    pub fn recording_spawner(
        launches: Arc<Mutex<Vec<(JobId, Invocation)>>>,
        terminations: Arc<Mutex<Vec<JobId>>>,
    ) -> MockProcessSpawner {
        let mut spawner = MockProcessSpawner::new();
        spawner.expect_spawn().returning(move |job, invocation, _| {
            launches.lock().unwrap().push((job, invocation.clone()));
            let terminations = terminations.clone();
            let mut handle = MockProcessHandle::new();
            handle.expect_pid().return_const(Some(4242));
            handle
                .expect_terminate()
                .returning(move || terminations.lock().unwrap().push(job));
            Ok(Box::new(handle))
        });
        spawner
    }

    pub fn stderr(job: JobId, text: &str) -> ProcessEvent {
        ProcessEvent {
            job,
            kind: ProcessEventKind::Stderr(text.as_bytes().to_vec()),
        }
    }

    pub fn stdout(job: JobId, text: &str) -> ProcessEvent {
        ProcessEvent {
            job,
            kind: ProcessEventKind::Stdout(text.as_bytes().to_vec()),
        }
    }

    pub fn exited(job: JobId, code: i32) -> ProcessEvent {
        ProcessEvent {
            job,
            kind: ProcessEventKind::Exited(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::testing::*;
    use super::*;
    use crate::core::traits::process::{MockProcessSpawner, SpawnError};

    #[test]
    fn test_decoder_holds_back_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "┌─ a".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "");
        assert_eq!(decoder.decode(&bytes[2..]), "┌─ a");
        assert_eq!(decoder.flush(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'x', 0xe2, 0x94]), "x");
        assert_eq!(decoder.flush(), "\u{fffd}");
    }

    #[test]
    fn test_factory_selects_variant() {
        let harness = Harness::new();
        let on_demand = create_strategy(
            Some(CompilerMode::OnDemand),
            harness.context.clone(),
            None,
            None,
        );
        let live = create_strategy(Some(CompilerMode::Live), harness.context.clone(), None, None);
        let dummy = create_strategy(None, harness.context.clone(), None, None);

        assert_eq!(on_demand.mode(), Some(CompilerMode::OnDemand));
        assert_eq!(live.mode(), Some(CompilerMode::Live));
        assert_eq!(dummy.mode(), None);
    }

    #[test]
    fn test_empty_paths_are_rejected() {
        let harness = Harness::new();
        let mut base = harness.base(Some("a.typ"), Some(""));
        assert_eq!(base.output_path(), None);

        base.set_input_path(PathBuf::new());
        assert_eq!(base.input_path(), Some(Path::new("a.typ")));

        base.set_output_path(PathBuf::from("a.pdf"));
        assert_eq!(base.output_path(), Some(Path::new("a.pdf")));
    }

    #[test]
    fn test_launch_uses_current_working_directory() {
        let mut harness = Harness::new();
        let mut base = harness.base(Some("a.typ"), Some("a.pdf"));

        harness
            .working_directory
            .send_replace(PathBuf::from("/projects/thesis"));
        let job = base.launch("compile").expect("launch should succeed");

        let (launched, invocation) = harness.last_launch();
        assert_eq!(launched, job);
        assert_eq!(invocation.program, "typst");
        assert_eq!(invocation.args, vec!["compile", "a.typ", "a.pdf"]);
        assert_eq!(invocation.cwd, PathBuf::from("/projects/thesis"));
        assert_eq!(harness.drain(), vec![CompilerEvent::Started]);
    }

    #[test]
    fn test_launch_failure_reports_stopped() {
        let mut spawner = MockProcessSpawner::new();
        spawner.expect_spawn().returning(|_, invocation, _| {
            Err(SpawnError::Launch {
                program: invocation.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        let mut harness = Harness::with_spawner(
            spawner,
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(Mutex::new(Vec::new())),
        );
        let mut base = harness.base(Some("a.typ"), Some("a.pdf"));

        assert!(base.launch("compile").is_none());
        assert!(!base.is_running());
        assert_eq!(harness.drain(), vec![CompilerEvent::Stopped]);
    }

    #[test]
    fn test_accept_ignores_other_jobs() {
        let mut harness = Harness::new();
        let mut base = harness.base(Some("a.typ"), Some("a.pdf"));
        let job = base.launch("compile").unwrap();
        harness.drain();

        assert_eq!(base.accept(stderr(JobId::new(), "stale")), None);
        assert_eq!(
            base.accept(stderr(job, "fresh")),
            Some(JobOutput::Stderr("fresh".to_string()))
        );
        assert_eq!(base.job().unwrap().stderr, "fresh");
        assert_eq!(
            harness.drain(),
            vec![CompilerEvent::NewStderr("fresh".to_string())]
        );
    }

    #[test]
    fn test_detach_terminates_process() {
        let harness = Harness::new();
        let mut base = harness.base(Some("a.typ"), Some("a.pdf"));
        let job = base.launch("compile").unwrap();

        let detached = base.detach().unwrap();
        assert_eq!(detached.id, job);
        assert!(!base.is_running());
        assert_eq!(*harness.terminations.lock().unwrap(), vec![job]);
        assert_eq!(base.accept(exited(job, 0)), None);
    }
}
