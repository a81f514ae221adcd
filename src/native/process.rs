use std::process::Stdio;

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::oneshot,
    task::JoinHandle,
};

use crate::{
    constants::{KILLED_OUTPUT_DRAIN_TIMEOUT, READ_CHUNK_SIZE, STOPPED_EXIT_CODE},
    core::{
        domain::JobId,
        traits::process::{
            Invocation, ProcessEvent, ProcessEventKind, ProcessEventSender, ProcessHandle,
            ProcessSpawner, SpawnError,
        },
    },
};

/// Spawns the compiler as a child process of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeSpawner;

impl NativeSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for NativeSpawner {
    fn spawn(
        &self,
        job: JobId,
        invocation: &Invocation,
        events: ProcessEventSender,
    ) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Launch {
                program: invocation.program.clone(),
                source,
            })?;

        let pid = child.id();
        let readers = child_output(job, &mut child, &events);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(job, readers, child, kill_rx, events));

        Ok(Box::new(NativeHandle {
            pid,
            kill: Some(kill_tx),
        }))
    }
}

#[derive(Debug)]
struct NativeHandle {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle for NativeHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            if kill.send(()).is_err() {
                tracing::trace!("Process {:?} already exited", self.pid);
            }
        }
    }
}

/// Starts forwarding the child's stdout and stderr.
fn child_output(job: JobId, child: &mut Child, events: &ProcessEventSender) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward(job, stdout, events.clone(), ProcessEventKind::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward(job, stderr, events.clone(), ProcessEventKind::Stderr)));
    }
    readers
}

async fn forward<R>(
    job: JobId,
    mut reader: R,
    events: ProcessEventSender,
    kind: fn(Vec<u8>) -> ProcessEventKind,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                // Keep draining a detached job so it never blocks on a full pipe.
                let _ = events.send(ProcessEvent {
                    job,
                    kind: kind(buf[..n].to_vec()),
                });
            }
            Err(e) => {
                tracing::warn!("Failed to read output of job {}: {}", job, e);
                break;
            }
        }
    }
}

/// Waits for the child to exit or to be killed, then reports the exit once
/// all of its output was forwarded. Dropping the kill sender kills the child.
///
/// After a kill, processes the child started may still hold its output open.
/// Their output is given up on after [`KILLED_OUTPUT_DRAIN_TIMEOUT`].
#[tracing::instrument(skip(readers, child, kill, events))]
async fn supervise(
    job: JobId,
    mut readers: Vec<JoinHandle<()>>,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    events: ProcessEventSender,
) {
    let (status, killed) = tokio::select! {
        status = child.wait() => (status, false),
        _ = kill => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill compiler process: {}", e);
            }
            (child.wait().await, true)
        }
    };

    if killed {
        let drained =
            tokio::time::timeout(KILLED_OUTPUT_DRAIN_TIMEOUT, join_readers(job, &mut readers))
                .await;
        if drained.is_err() {
            tracing::debug!("Output of killed job {} is still open, dropping it", job);
            for reader in &readers {
                reader.abort();
            }
        }
    } else {
        join_readers(job, &mut readers).await;
    }

    let code = match status {
        Ok(status) => status.code().unwrap_or(STOPPED_EXIT_CODE),
        Err(e) => {
            tracing::error!("Failed to wait for compiler process: {}", e);
            STOPPED_EXIT_CODE
        }
    };
    tracing::debug!("Job {} exited with code {}", job, code);

    if events
        .send(ProcessEvent {
            job,
            kind: ProcessEventKind::Exited(code),
        })
        .is_err()
    {
        tracing::trace!("Nobody is listening for the exit of job {}", job);
    }
}

async fn join_readers(job: JobId, readers: &mut [JoinHandle<()>]) {
    for reader in readers.iter_mut() {
        if let Err(e) = reader.await {
            tracing::error!("Output reader of job {} failed: {}", job, e);
        }
    }
}
