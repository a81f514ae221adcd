use crate::core::{
    domain::CompilerMode,
    strategy::StrategyBase,
    traits::{process::ProcessEvent, strategy::CompilerStrategy},
};

/// Stands in when no valid compiler mode was requested. Never compiles.
#[derive(Debug)]
pub struct DummyStrategy {
    base: StrategyBase,
}

impl DummyStrategy {
    pub fn new(base: StrategyBase) -> Self {
        Self { base }
    }
}

impl CompilerStrategy for DummyStrategy {
    fn mode(&self) -> Option<CompilerMode> {
        None
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StrategyBase {
        &mut self.base
    }

    fn start(&mut self) {
        tracing::warn!("No valid compiler mode is set, ignoring start");
    }

    fn stop(&mut self) {
        tracing::warn!("No valid compiler mode is set, ignoring stop");
    }

    fn notify_source_changed(&mut self) {
        tracing::warn!("No valid compiler mode is set, ignoring source change");
    }

    fn handle_process_event(&mut self, event: ProcessEvent) {
        tracing::debug!("Ignoring event of job {}", event.job);
    }
}
