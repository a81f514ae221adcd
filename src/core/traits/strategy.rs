use std::path::{Path, PathBuf};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::core::{
    domain::{CompilerEvent, CompilerMode, JobId},
    strategy::StrategyBase,
    traits::process::ProcessEvent,
};

/// Outbox every strategy writes its events to.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: UnboundedSender<CompilerEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, UnboundedReceiver<CompilerEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: CompilerEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("Dropped {:?}, strategy is disconnected", e.0);
        }
    }
}

/// One policy for turning compile requests into compiler processes.
///
/// All calls return immediately; progress is reported through the strategy's
/// [`EventEmitter`] as process events are fed back via `handle_process_event`.
pub trait CompilerStrategy: std::fmt::Debug + Send {
    /// `None` for the inert strategy used when the requested mode is unknown.
    fn mode(&self) -> Option<CompilerMode>;

    fn base(&self) -> &StrategyBase;

    fn base_mut(&mut self) -> &mut StrategyBase;

    fn start(&mut self);

    fn stop(&mut self);

    fn notify_source_changed(&mut self);

    fn handle_process_event(&mut self, event: ProcessEvent);

    fn input_path(&self) -> Option<&Path> {
        self.base().input_path()
    }

    fn output_path(&self) -> Option<&Path> {
        self.base().output_path()
    }

    fn set_input_path(&mut self, path: PathBuf) {
        self.base_mut().set_input_path(path);
    }

    fn set_output_path(&mut self, path: PathBuf) {
        self.base_mut().set_output_path(path);
    }

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    fn current_job(&self) -> Option<JobId> {
        self.base().current_job()
    }
}
