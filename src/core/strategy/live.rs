use crate::{
    constants::WATCH_SUBCOMMAND,
    core::{
        domain::{CompilerEvent, CompilerMode, ErrorReport},
        markers::{self, MarkerMatch, WatchStatus},
        strategy::{JobOutput, StrategyBase},
        traits::{process::ProcessEvent, strategy::CompilerStrategy},
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Pass {
    #[default]
    None,
    Compiling,
    Failed,
    Succeeded,
}

/// Keeps one `compiler watch <input> <output>` process alive and follows the
/// passes it reports on stderr.
#[derive(Debug)]
pub struct LiveStrategy {
    base: StrategyBase,
    pass: Pass,
    pass_started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Stderr since the last `compiling` marker.
    pass_stderr: String,
    last_report: Option<ErrorReport>,
    /// End of the previous chunk, scanned again with the next one.
    carry: String,
}

impl LiveStrategy {
    pub fn new(base: StrategyBase) -> Self {
        Self {
            base,
            pass: Pass::None,
            pass_started_at: None,
            pass_stderr: String::new(),
            last_report: None,
            carry: String::new(),
        }
    }

    fn reset(&mut self) {
        self.pass = Pass::None;
        self.pass_started_at = None;
        self.pass_stderr.clear();
        self.last_report = None;
        self.carry.clear();
    }

    /// Markers in `chunk`, including one that began in the previous chunk.
    /// Ranges are relative to `chunk`.
    fn scan(&mut self, chunk: &str) -> Vec<MarkerMatch> {
        let offset = self.carry.len();
        let combined = format!("{}{}", self.carry, chunk);
        let found = markers::scan(&combined)
            .into_iter()
            .filter(|m| m.end > offset)
            .map(|m| MarkerMatch {
                start: m.start.saturating_sub(offset),
                end: m.end - offset,
                ..m
            })
            .collect();
        self.carry = markers::unfinished_tail(&combined).to_string();
        found
    }

    fn handle_stderr(&mut self, chunk: &str) {
        let mut cursor = 0;
        let found = self.scan(chunk);

        for (i, marker) in found.iter().enumerate() {
            if marker.start < cursor {
                continue;
            }
            match marker.status {
                WatchStatus::Compiling => {
                    self.append_to_pass(&chunk[cursor..marker.start]);
                    cursor = marker.start;
                    self.begin_pass();
                }
                WatchStatus::CompiledWithErrors | WatchStatus::CompiledSuccessfully => {
                    // Diagnostics follow the status line up to the next marker.
                    let end = found
                        .get(i + 1)
                        .map_or(chunk.len(), |next| next.start.max(marker.end));
                    self.pass_stderr.push_str(&chunk[cursor..end]);
                    cursor = end;
                    self.end_pass(marker.status == WatchStatus::CompiledSuccessfully);
                }
            }
        }

        self.append_to_pass(&chunk[cursor..]);
    }

    fn begin_pass(&mut self) {
        tracing::debug!("Compilation started");
        self.pass = Pass::Compiling;
        self.pass_started_at = Some(chrono::Utc::now());
        self.pass_stderr.clear();
        self.last_report = None;
        self.base.emit(CompilerEvent::CompilationStarted);
    }

    fn end_pass(&mut self, success: bool) {
        let input = self
            .base
            .input_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let elapsed = self
            .pass_started_at
            .take()
            .map(|at| (chrono::Utc::now() - at).num_milliseconds());

        if success {
            tracing::debug!("Compiled {} successfully in {:?}ms", input, elapsed);
            self.pass = Pass::Succeeded;
            self.base.emit(CompilerEvent::DocumentChanged);
        } else {
            tracing::debug!("Compiled {} with errors in {:?}ms", input, elapsed);
            self.pass = Pass::Failed;
            let report = self.pass_report();
            self.last_report = Some(report.clone());
            self.base.emit(CompilerEvent::ErrorReport(report));
        }
        self.base.emit(CompilerEvent::CompilationFinished);
    }

    /// Stderr after a failed pass's status line may still carry diagnostics of
    /// that pass; the report is re-sent when they change it.
    fn append_to_pass(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.pass_stderr.push_str(text);

        if self.pass == Pass::Failed {
            let report = self.pass_report();
            if self.last_report.as_ref() != Some(&report) {
                self.last_report = Some(report.clone());
                self.base.emit(CompilerEvent::ErrorReport(report));
            }
        }
    }

    fn pass_report(&self) -> ErrorReport {
        self.base
            .job()
            .map(|job| job.parse_diagnostics(&self.pass_stderr))
            .unwrap_or_default()
    }

    /// Closes the bookkeeping of a process that is gone.
    fn wind_down(&mut self) {
        if self.pass == Pass::Compiling {
            self.base.emit(CompilerEvent::CompilationFinished);
        }
        self.reset();
        self.base.emit(CompilerEvent::Stopped);
    }
}

impl CompilerStrategy for LiveStrategy {
    fn mode(&self) -> Option<CompilerMode> {
        Some(CompilerMode::Live)
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StrategyBase {
        &mut self.base
    }

    fn start(&mut self) {
        if self.base.is_running() {
            tracing::info!("Attempted to start the compiler but it is already running");
            return;
        }

        self.reset();
        if let Some(job) = self.base.launch(WATCH_SUBCOMMAND) {
            tracing::debug!("Watching with job {}", job);
        }
    }

    fn stop(&mut self) {
        if self.base.detach().is_none() {
            tracing::info!("Attempted to stop the compiler but it is not running");
            return;
        }
        self.wind_down();
    }

    /// The watch process follows the files itself.
    fn notify_source_changed(&mut self) {}

    fn handle_process_event(&mut self, event: ProcessEvent) {
        match self.base.accept(event) {
            Some(JobOutput::Stderr(text)) => self.handle_stderr(&text),
            Some(JobOutput::Exited(code)) => {
                tracing::info!("Compiler stopped with exit code {}", code);
                self.base.finish();
                self.wind_down();
            }
            Some(JobOutput::Stdout(_)) | None => {}
        }
    }
}
