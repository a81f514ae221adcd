//! Turns the human readable diagnostics of a failed compilation into an [`ErrorReport`].
//!
//! The compiler prints every error as
//!
//! ```text
//! error: unknown variable: foo
//!   ┌─ chapters/intro.typ:3:2
//!   │
//! 3 │ #foo
//!   │  ^^^
//! ```
//!
//! Only blocks with a message, a location and an underline become diagnostics;
//! everything else is skipped.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::domain::{DiagnosticEntry, ErrorReport};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI regex"));

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*error:\s*(?P<message>.*?)\s*$").expect("valid error regex"));

static OTHER_SEVERITY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*warning:").expect("valid severity regex"));

static LOCATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*┌─\s*(?P<path>.+):(?P<line>\d+):(?P<column>\d+)\s*$")
        .expect("valid location regex")
});

static UNDERLINE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s+)?[│|]\s*(?P<marks>[\^~]+)(?:\s.*)?$").expect("valid underline regex")
});

#[derive(Debug)]
struct Location {
    path: String,
    line: usize,
    column: usize,
}

#[derive(Debug)]
struct PendingError {
    message: String,
    location: Option<Location>,
}

/// Parses `stderr` and resolves relative paths against `working_directory`.
pub fn parse(stderr: &str, working_directory: &Path) -> ErrorReport {
    let mut report = ErrorReport::new();
    let mut pending: Option<PendingError> = None;

    for raw_line in stderr.lines() {
        let line = ANSI_ESCAPE.replace_all(raw_line, "");

        if let Some(caps) = ERROR_LINE.captures(&line) {
            skip_incomplete(pending.take());
            pending = Some(PendingError {
                message: caps["message"].to_string(),
                location: None,
            });
            continue;
        }

        if OTHER_SEVERITY_LINE.is_match(&line) {
            skip_incomplete(pending.take());
            continue;
        }

        let Some(error) = pending.as_mut() else {
            continue;
        };

        if error.location.is_none() {
            if let Some(caps) = LOCATION_LINE.captures(&line) {
                error.location = parse_location(&caps);
                if error.location.is_none() {
                    tracing::warn!("Skipping diagnostic with malformed location: {:?}", line);
                    pending = None;
                }
            }
            continue;
        }

        if let Some(caps) = UNDERLINE_LINE.captures(&line) {
            let underline_length = caps["marks"].chars().count();
            if let Some(PendingError {
                message,
                location: Some(location),
            }) = pending.take()
            {
                report.push(
                    resolve(working_directory, &location.path),
                    DiagnosticEntry {
                        message,
                        line: location.line,
                        column: location.column,
                        underline_length,
                    },
                );
            }
        }
    }

    skip_incomplete(pending);

    tracing::debug!(
        "Parsed {} diagnostics in {} files",
        report.diagnostic_count(),
        report.len()
    );
    report
}

fn parse_location(caps: &regex::Captures<'_>) -> Option<Location> {
    let line = caps["line"].parse::<usize>().ok()?;
    let column = caps["column"].parse::<usize>().ok()?;
    Some(Location {
        path: caps["path"].trim().to_string(),
        line,
        // Printed 1-based, stored 0-based.
        column: column.saturating_sub(1),
    })
}

fn skip_incomplete(pending: Option<PendingError>) {
    if let Some(error) = pending {
        match error.location {
            None => tracing::warn!("Skipping diagnostic without location: {}", error.message),
            Some(location) => tracing::warn!(
                "Skipping diagnostic without underline: {} at {}:{}",
                error.message,
                location.path,
                location.line
            ),
        }
    }
}

/// Joins `path` onto `base` and removes `.` and `..` components lexically.
fn resolve(base: &Path, path: &str) -> PathBuf {
    let joined = base.join(path);
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push(component);
                }
            }
            other => resolved.push(other),
        }
    }
    resolved
}
