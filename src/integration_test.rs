//! End to end runs of the supervisor against real child processes.
//!
//! The compiler is `sh`, which reads the scripts named `compile` and `watch`
//! from the working directory, so `sh compile in out` behaves like
//! `typst compile in out`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::core::domain::{CompilerEvent, CompilerMode};
use crate::core::state::AppState;
use crate::core::supervisor::{Supervisor, SupervisorHandle};
use crate::native::process::NativeSpawner;

const COMPILE_SCRIPT: &str = r#"
case "$(cat "$1")" in
  *SLOW*) exec sleep 30 ;;
  *ERROR*)
    printf 'error: unknown variable: x\n  ┌─ %s:2:1\n  │\n2 │ #x\n  │  ^\n' "$1" >&2
    exit 1 ;;
esac
echo "compiled $1"
cp "$1" "$2"
"#;

const WATCH_SCRIPT: &str = r#"
echo "[12:00:00] compiling ..." >&2
cp "$1" "$2"
echo "[12:00:00] compiled successfully in 1.00ms" >&2
exec sleep 30
"#;

struct Project {
    dir: TempDir,
    handle: SupervisorHandle,
    events: broadcast::Receiver<CompilerEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl Project {
    fn new(source: &str, mode: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("compile"), COMPILE_SCRIPT).unwrap();
        fs::write(dir.path().join("watch"), WATCH_SCRIPT).unwrap();
        fs::write(dir.path().join("main.typ"), source).unwrap();

        let state = Arc::new(AppState::new(
            dir.path().to_path_buf(),
            CompilerMode::OnDemand,
        ));
        let supervisor = Supervisor::new(
            "sh",
            Arc::new(NativeSpawner::new()),
            state,
            mode,
            Some(dir.path().join("main.typ")),
            Some(dir.path().join("main.pdf")),
        );
        let (handle, task) = supervisor.spawn();
        let events = handle.subscribe();

        Self {
            dir,
            handle,
            events,
            task,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Collects events up to and including the first one equal to `last`.
    async fn until(&mut self, last: CompilerEvent) -> Vec<CompilerEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {:?}, saw {:?}", last, seen))
                .unwrap();
            let done = event == last;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    async fn shutdown(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
    }
}

fn reports(events: &[CompilerEvent]) -> Vec<&crate::core::domain::ErrorReport> {
    events
        .iter()
        .filter_map(|e| match e {
            CompilerEvent::ErrorReport(report) => Some(report),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_on_demand_compiles_document() {
    let mut project = Project::new("= Hello", "on_demand");

    project.handle.start().await.unwrap();
    let events = project.until(CompilerEvent::Stopped).await;

    assert!(events.contains(&CompilerEvent::DocumentChanged));
    assert!(reports(&events).is_empty());
    assert!(
        events
            .iter()
            .any(|e| matches!(e, CompilerEvent::NewStdout(text) if text.starts_with("compiled ")))
    );
    assert_eq!(
        fs::read_to_string(project.path("main.pdf")).unwrap(),
        "= Hello"
    );

    project.shutdown().await;
}

#[tokio::test]
async fn test_on_demand_reports_diagnostics() {
    let mut project = Project::new("ERROR", "on_demand");

    project.handle.start().await.unwrap();
    let events = project.until(CompilerEvent::Stopped).await;

    assert!(!events.contains(&CompilerEvent::DocumentChanged));
    let reports = reports(&events);
    assert_eq!(reports.len(), 1);
    let entries = reports[0]
        .get(&project.path("main.typ"))
        .expect("diagnostics for main.typ");
    assert_eq!(entries[0].message, "unknown variable: x");
    assert_eq!((entries[0].line, entries[0].column), (2, 0));
    assert_eq!(entries[0].underline_length, 1);
    assert!(!project.path("main.pdf").exists());

    project.shutdown().await;
}

#[tokio::test]
async fn test_stop_interrupts_compilation() {
    let mut project = Project::new("SLOW", "on_demand");

    project.handle.start().await.unwrap();
    project.until(CompilerEvent::CompilationStarted).await;
    project.handle.stop().await.unwrap();

    let events = project.until(CompilerEvent::Stopped).await;
    assert_eq!(
        events,
        vec![
            CompilerEvent::ErrorReport(Default::default()),
            CompilerEvent::CompilationFinished,
            CompilerEvent::Stopped,
        ]
    );

    // The killed process's own exit must not show up as another stop.
    let late = tokio::time::timeout(Duration::from_millis(300), project.events.recv()).await;
    assert!(late.is_err(), "unexpected event {:?}", late);

    project.shutdown().await;
}

#[tokio::test]
async fn test_live_mode_follows_watch_process() {
    let mut project = Project::new("= Live", "live");

    project.handle.start().await.unwrap();
    let events = project.until(CompilerEvent::CompilationFinished).await;
    assert_eq!(events.first(), Some(&CompilerEvent::Started));
    assert!(events.contains(&CompilerEvent::CompilationStarted));
    assert!(events.contains(&CompilerEvent::DocumentChanged));
    assert!(project.path("main.pdf").exists());

    project.handle.stop().await.unwrap();
    project.until(CompilerEvent::Stopped).await;

    project.shutdown().await;
}

#[tokio::test]
async fn test_switching_mode_keeps_target() {
    let mut project = Project::new("= Switch", "on_demand");

    project.handle.switch_mode(CompilerMode::Live).await.unwrap();
    project.handle.start().await.unwrap();
    let events = project.until(CompilerEvent::DocumentChanged).await;

    assert_eq!(events.first(), Some(&CompilerEvent::Started));
    assert!(project.path("main.pdf").exists());

    project.shutdown().await;
}
