use crate::{
    constants::{COMPILE_SUBCOMMAND, STOPPED_EXIT_CODE},
    core::{
        domain::{CompilationJob, CompilerEvent, CompilerMode, ErrorReport},
        strategy::{JobOutput, StrategyBase},
        traits::{process::ProcessEvent, strategy::CompilerStrategy},
    },
};

/// Runs `compiler compile <input> <output>` once per request.
///
/// Requests arriving while a compilation runs are coalesced into a single
/// follow-up compilation.
#[derive(Debug)]
pub struct OnDemandStrategy {
    base: StrategyBase,
    recompile_scheduled: bool,
}

impl OnDemandStrategy {
    pub fn new(base: StrategyBase) -> Self {
        Self {
            base,
            recompile_scheduled: false,
        }
    }

    pub fn recompile_scheduled(&self) -> bool {
        self.recompile_scheduled
    }

    fn finish_job(&mut self, job: CompilationJob, exit_code: i32) {
        let elapsed = job.elapsed_ms();

        match exit_code {
            0 => {
                tracing::debug!(
                    "Compiled {} successfully in {}ms",
                    job.input.display(),
                    elapsed
                );
                self.base.emit(CompilerEvent::DocumentChanged);
            }
            STOPPED_EXIT_CODE => {
                // Output of a terminated process may be cut off.
                tracing::debug!("Compilation of {} stopped after {}ms", job.input.display(), elapsed);
                self.base.emit(CompilerEvent::ErrorReport(ErrorReport::new()));
            }
            code => {
                tracing::debug!(
                    "Compiled {} with errors (exit code {}) in {}ms",
                    job.input.display(),
                    code,
                    elapsed
                );
                let report = job.parse_diagnostics(&job.stderr);
                self.base.emit(CompilerEvent::ErrorReport(report));
            }
        }

        self.base.emit(CompilerEvent::CompilationFinished);
        self.base.emit(CompilerEvent::Stopped);

        if self.recompile_scheduled {
            self.recompile_scheduled = false;
            tracing::debug!("Running scheduled recompilation");
            self.start();
        }
    }
}

impl CompilerStrategy for OnDemandStrategy {
    fn mode(&self) -> Option<CompilerMode> {
        Some(CompilerMode::OnDemand)
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StrategyBase {
        &mut self.base
    }

    fn start(&mut self) {
        if self.base.is_running() {
            tracing::debug!("Compilation in progress, scheduling recompilation");
            self.recompile_scheduled = true;
            return;
        }

        if self.base.launch(COMPILE_SUBCOMMAND).is_some() {
            tracing::debug!("Compilation started");
            self.base.emit(CompilerEvent::CompilationStarted);
        }
    }

    fn stop(&mut self) {
        let Some(job) = self.base.detach() else {
            tracing::info!("Attempted to stop the compiler but it is not running");
            return;
        };

        self.recompile_scheduled = false;
        self.finish_job(job, STOPPED_EXIT_CODE);
    }

    /// A change during a compilation may not have been seen by it, so one more
    /// compilation is scheduled. An idle compiler waits for an explicit start.
    fn notify_source_changed(&mut self) {
        if self.base.is_running() {
            self.recompile_scheduled = true;
        }
    }

    fn handle_process_event(&mut self, event: ProcessEvent) {
        if let Some(JobOutput::Exited(code)) = self.base.accept(event) {
            if let Some(job) = self.base.finish() {
                self.finish_job(job, code);
            }
        }
    }
}
