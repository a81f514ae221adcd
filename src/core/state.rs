use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::core::domain::CompilerMode;

/// Observable application state shared by the supervisor and its collaborators.
///
/// Every value is a `watch` channel: readers always see the latest value and
/// can await changes.
#[derive(Debug)]
pub struct AppState {
    pub working_directory: watch::Sender<PathBuf>,
    pub main_file: watch::Sender<Option<PathBuf>>,
    pub compiler_mode: watch::Sender<CompilerMode>,
    pub compiler_running: watch::Sender<bool>,
}

impl AppState {
    pub fn new(working_directory: PathBuf, compiler_mode: CompilerMode) -> Self {
        Self {
            working_directory: watch::Sender::new(working_directory),
            main_file: watch::Sender::new(None),
            compiler_mode: watch::Sender::new(compiler_mode),
            compiler_running: watch::Sender::new(false),
        }
    }

    pub fn working_directory(&self) -> PathBuf {
        self.working_directory.borrow().clone()
    }

    pub fn set_working_directory(&self, path: PathBuf) {
        self.working_directory.send_if_modified(|current| replace_if_changed(current, path));
    }

    pub fn main_file(&self) -> Option<PathBuf> {
        self.main_file.borrow().clone()
    }

    pub fn set_main_file(&self, path: Option<PathBuf>) {
        self.main_file.send_if_modified(|current| replace_if_changed(current, path));
    }

    pub fn compiler_mode(&self) -> CompilerMode {
        *self.compiler_mode.borrow()
    }

    pub fn set_compiler_mode(&self, mode: CompilerMode) {
        self.compiler_mode.send_if_modified(|current| replace_if_changed(current, mode));
    }

    pub fn compiler_running(&self) -> bool {
        *self.compiler_running.borrow()
    }

    pub fn set_compiler_running(&self, running: bool) {
        self.compiler_running.send_if_modified(|current| replace_if_changed(current, running));
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, new: T) -> bool {
    if *current == new {
        false
    } else {
        *current = new;
        true
    }
}

/// Output path the compiler writes for a given source file.
pub fn pdf_path(source: &Path) -> PathBuf {
    source.with_extension("pdf")
}
