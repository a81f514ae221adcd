use std::time::Duration;

use tokio::sync::oneshot;

use crate::{
    constants::{
        COMPILE_SUBCOMMAND, STOPPED_EXIT_CODE, TEXT_COMPILED_SUCCESSFULLY,
        TEXT_COMPILED_WITH_ERRORS, TEXT_COMPILING, WATCH_SUBCOMMAND,
    },
    core::{
        domain::JobId,
        traits::process::{
            Invocation, ProcessEvent, ProcessEventKind, ProcessEventSender, ProcessHandle,
            ProcessSpawner, SpawnError,
        },
    },
};

/// Pretends to be the compiler without running anything.
///
/// `compile` jobs print the configured output after `delay` and exit with
/// `exit_code`. `watch` jobs run one pass, succeeding when `exit_code` is 0,
/// and then wait to be terminated.
#[derive(Debug, Clone)]
pub struct ProcessStub {
    exit_code: i32,
    stdout: String,
    stderr: String,
    delay: Duration,
}

impl ProcessStub {
    pub fn new(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            delay,
        }
    }

    async fn compile(self, job: JobId, events: ProcessEventSender, mut kill: oneshot::Receiver<()>) {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = &mut kill => {
                send(&events, job, ProcessEventKind::Exited(STOPPED_EXIT_CODE));
                return;
            }
        }
        send_text(&events, job, &self.stdout, ProcessEventKind::Stdout);
        send_text(&events, job, &self.stderr, ProcessEventKind::Stderr);
        send(&events, job, ProcessEventKind::Exited(self.exit_code));
    }

    async fn watch(self, job: JobId, events: ProcessEventSender, mut kill: oneshot::Receiver<()>) {
        send_text(&events, job, &format!("[stub] {}\n", TEXT_COMPILING), ProcessEventKind::Stderr);
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {
                let status = if self.exit_code == 0 {
                    format!("[stub] {} in {}ms\n", TEXT_COMPILED_SUCCESSFULLY, self.delay.as_millis())
                } else {
                    format!("[stub] {}\n", TEXT_COMPILED_WITH_ERRORS)
                };
                send_text(&events, job, &self.stdout, ProcessEventKind::Stdout);
                send_text(&events, job, &(status + &self.stderr), ProcessEventKind::Stderr);
                let _ = (&mut kill).await;
            }
            _ = &mut kill => {}
        }
        send(&events, job, ProcessEventKind::Exited(STOPPED_EXIT_CODE));
    }
}

impl ProcessSpawner for ProcessStub {
    #[tracing::instrument(skip(self, events))]
    fn spawn(
        &self,
        job: JobId,
        invocation: &Invocation,
        events: ProcessEventSender,
    ) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        tracing::debug!("Start stub job: {}", invocation);
        let (kill_tx, kill_rx) = oneshot::channel();
        let stub = self.clone();

        match invocation.subcommand() {
            Some(COMPILE_SUBCOMMAND) => {
                tokio::spawn(stub.compile(job, events, kill_rx));
            }
            Some(WATCH_SUBCOMMAND) => {
                tokio::spawn(stub.watch(job, events, kill_rx));
            }
            other => {
                tracing::warn!("Stub does not know subcommand {:?}", other);
                send(&events, job, ProcessEventKind::Exited(self.exit_code));
            }
        }

        Ok(Box::new(StubHandle {
            kill: Some(kill_tx),
        }))
    }
}

#[derive(Debug)]
struct StubHandle {
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle for StubHandle {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

fn send(events: &ProcessEventSender, job: JobId, kind: ProcessEventKind) {
    if events.send(ProcessEvent { job, kind }).is_err() {
        tracing::trace!("Stub job {} is detached", job);
    }
}

fn send_text(
    events: &ProcessEventSender,
    job: JobId,
    text: &str,
    kind: fn(Vec<u8>) -> ProcessEventKind,
) {
    if !text.is_empty() {
        send(events, job, kind(text.as_bytes().to_vec()));
    }
}
