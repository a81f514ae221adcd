//! The compiler supervisor: a mode independent front for the active strategy.
//!
//! Collaborators subscribe to the supervisor's event bus once. Switching the
//! compiler mode replaces the strategy behind it, never the bus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{
    broadcast,
    mpsc::{self, UnboundedReceiver},
    watch,
};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    constants::{COMMAND_CHANNEL_CAPACITY, EVENT_BUS_CAPACITY},
    core::{
        domain::{CompilerCommand, CompilerEvent, CompilerMode},
        state::{AppState, pdf_path},
        strategy::{StrategyContext, create_strategy},
        traits::{
            process::{ProcessEvent, ProcessSpawner},
            strategy::{CompilerStrategy, EventEmitter},
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("The compiler supervisor has shut down")]
    Closed,
}

/// A strategy together with the receiving ends of its channels.
/// Dropping it disconnects the strategy.
#[derive(Debug)]
struct Connection {
    strategy: Box<dyn CompilerStrategy>,
    events: UnboundedReceiver<CompilerEvent>,
    process_events: UnboundedReceiver<ProcessEvent>,
}

#[derive(Debug)]
pub struct Supervisor {
    compiler: String,
    spawner: Arc<dyn ProcessSpawner>,
    state: Arc<AppState>,
    mode: Option<CompilerMode>,
    connection: Connection,
    bus: broadcast::Sender<CompilerEvent>,
    mode_changes: watch::Receiver<CompilerMode>,
    main_file_changes: watch::Receiver<Option<PathBuf>>,
}

impl Supervisor {
    /// Builds the strategy for `mode`. An unknown mode yields a strategy that
    /// never compiles.
    pub fn new(
        compiler: impl Into<String>,
        spawner: Arc<dyn ProcessSpawner>,
        state: Arc<AppState>,
        mode: &str,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> Self {
        let mode = match mode.parse::<CompilerMode>() {
            Ok(mode) => Some(mode),
            Err(e) => {
                tracing::warn!("{}, compilation is disabled", e);
                None
            }
        };
        let compiler = compiler.into();
        let connection = connect(&compiler, &spawner, &state, mode, input, output);
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let mode_changes = state.compiler_mode.subscribe();
        let main_file_changes = state.main_file.subscribe();

        Self {
            compiler,
            spawner,
            state,
            mode,
            connection,
            bus,
            mode_changes,
            main_file_changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompilerEvent> {
        self.bus.subscribe()
    }

    pub fn mode(&self) -> Option<CompilerMode> {
        self.mode
    }

    pub fn strategy(&self) -> &dyn CompilerStrategy {
        self.connection.strategy.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.connection.strategy.is_running()
    }

    pub fn set_input_path(&mut self, path: PathBuf) {
        self.connection.strategy.set_input_path(path);
        self.relay();
    }

    pub fn set_output_path(&mut self, path: PathBuf) {
        self.connection.strategy.set_output_path(path);
        self.relay();
    }

    pub fn start(&mut self) {
        self.connection.strategy.start();
        self.relay();
    }

    pub fn stop(&mut self) {
        self.connection.strategy.stop();
        self.relay();
    }

    pub fn notify_source_changed(&mut self) {
        self.connection.strategy.notify_source_changed();
        self.relay();
    }

    pub fn handle_process_event(&mut self, event: ProcessEvent) {
        self.connection.strategy.handle_process_event(event);
        self.relay();
    }

    /// Replaces the strategy with one for `mode`, keeping the target paths.
    pub fn switch_mode(&mut self, mode: CompilerMode) {
        self.install(Some(mode));
        self.state.set_compiler_mode(mode);
    }

    /// Replaces the strategy with a fresh one of the same mode.
    pub fn restart(&mut self) {
        self.install(self.mode);
    }

    pub fn dispatch(&mut self, command: CompilerCommand) {
        tracing::debug!("Received command: {:?}", command);
        match command {
            CompilerCommand::SetInputPath(path) => self.set_input_path(path),
            CompilerCommand::SetOutputPath(path) => self.set_output_path(path),
            CompilerCommand::Start => self.start(),
            CompilerCommand::Stop => self.stop(),
            CompilerCommand::SourceChanged => self.notify_source_changed(),
            CompilerCommand::SwitchMode(mode) => self.switch_mode(mode),
            CompilerCommand::Restart => self.restart(),
            CompilerCommand::Shutdown => self.shutdown(),
        }
    }

    pub fn shutdown(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }

    /// Compiles `main` from now on, writing next to it.
    pub fn main_file_changed(&mut self, main: Option<&Path>) {
        if self.is_running() {
            self.stop();
        }
        if let Some(main) = main {
            self.set_input_path(main.to_path_buf());
            self.set_output_path(pdf_path(main));
        }
    }

    fn install(&mut self, mode: Option<CompilerMode>) {
        if self.is_running() {
            self.connection.strategy.stop();
        }
        self.relay();

        let input = self.strategy().input_path().map(Path::to_path_buf);
        let output = self.strategy().output_path().map(Path::to_path_buf);
        self.connection = connect(&self.compiler, &self.spawner, &self.state, mode, input, output);
        self.mode = mode;

        match mode {
            Some(mode) => tracing::info!("Compiler mode is now {}", mode),
            None => tracing::warn!("Compiler replaced by an inert one"),
        }
    }

    /// Forwards everything the strategy emitted to the subscribers.
    fn relay(&mut self) {
        while let Ok(event) = self.connection.events.try_recv() {
            match event {
                CompilerEvent::Started => self.state.set_compiler_running(true),
                CompilerEvent::Stopped => self.state.set_compiler_running(false),
                _ => {}
            }
            if let Err(e) = self.bus.send(event) {
                tracing::trace!("No subscriber for {:?}", e.0);
            }
        }
    }

    /// Event loop: serves commands, process events and state changes until
    /// `Shutdown` arrives or every command sender is gone.
    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, mut commands: mpsc::Receiver<CompilerCommand>) {
        tracing::info!("Compiler supervisor running in mode {:?}", self.mode);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(CompilerCommand::Shutdown) | None => break,
                    Some(command) => self.dispatch(command),
                },
                Some(event) = self.connection.process_events.recv() => {
                    self.handle_process_event(event);
                }
                Ok(()) = self.mode_changes.changed() => {
                    let mode = *self.mode_changes.borrow_and_update();
                    if self.mode != Some(mode) {
                        self.switch_mode(mode);
                    }
                }
                Ok(()) = self.main_file_changes.changed() => {
                    let main = self.main_file_changes.borrow_and_update().clone();
                    self.main_file_changed(main.as_deref());
                }
            }
        }

        self.shutdown();
        tracing::info!("Compiler supervisor stopped");
    }

    /// Runs the event loop on its own task.
    pub fn spawn(self) -> (SupervisorHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = SupervisorHandle {
            commands,
            bus: self.bus.clone(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }
}

fn connect(
    compiler: &str,
    spawner: &Arc<dyn ProcessSpawner>,
    state: &AppState,
    mode: Option<CompilerMode>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Connection {
    let (emitter, events) = EventEmitter::channel();
    let (process_tx, process_events) = mpsc::unbounded_channel();
    let context = StrategyContext {
        compiler: compiler.to_string(),
        working_directory: state.working_directory.subscribe(),
        spawner: spawner.clone(),
        process_events: process_tx,
        emitter,
    };
    tracing::debug!("Creating compiler with mode {:?}", mode);

    Connection {
        strategy: create_strategy(mode, context, input, output),
        events,
        process_events,
    }
}

/// Cloneable front door of a running [`Supervisor`].
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<CompilerCommand>,
    bus: broadcast::Sender<CompilerEvent>,
}

impl SupervisorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<CompilerEvent> {
        self.bus.subscribe()
    }

    pub fn events(&self) -> BroadcastStream<CompilerEvent> {
        BroadcastStream::new(self.bus.subscribe())
    }

    pub async fn send(&self, command: CompilerCommand) -> Result<(), SupervisorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SupervisorError::Closed)
    }

    pub async fn set_input_path(&self, path: PathBuf) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::SetInputPath(path)).await
    }

    pub async fn set_output_path(&self, path: PathBuf) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::SetOutputPath(path)).await
    }

    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::Stop).await
    }

    pub async fn source_changed(&self) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::SourceChanged).await
    }

    pub async fn switch_mode(&self, mode: CompilerMode) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::SwitchMode(mode)).await
    }

    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::Restart).await
    }

    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.send(CompilerCommand::Shutdown).await
    }
}
