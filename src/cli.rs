//! Command-line arguments and the line based console.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::core::domain::{CompilerCommand, CompilerEvent, CompilerMode, UnknownModeError};

/// Keeps a Typst document compiled while you edit it
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Main source file of the document
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output file (default: INPUT with a .pdf extension)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Compiler mode: on_demand or live (default: from config)
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Compiler program (default: from config)
    #[arg(short, long)]
    pub compiler: Option<String>,

    /// Directory the compiler runs in (default: from config)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub working_dir: Option<PathBuf>,

    /// Config file replacing the default search paths
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Log level: CRITICAL, ERROR, WARNING, INFO or DEBUG
    #[arg(short, long, default_value = "WARNING")]
    pub log_level: String,

    /// Simulate the compiler instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Maps a log level name to a tracing filter. Unknown names mean `INFO`.
pub fn log_level(name: &str) -> LevelFilter {
    match name.to_ascii_uppercase().as_str() {
        "CRITICAL" | "ERROR" => LevelFilter::ERROR,
        "WARNING" | "WARN" => LevelFilter::WARN,
        "INFO" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        "TRACE" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// A line typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Compiler(CompilerCommand),
    /// Makes another file the main file.
    Open(PathBuf),
    ChangeDirectory(PathBuf),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Unknown command `{0}`, try: run, stop, changed, restart, mode, open, cd, quit")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Mode(#[from] UnknownModeError),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        let argument = |name: &'static str| {
            if rest.is_empty() {
                Err(ConsoleError::MissingArgument(name))
            } else {
                Ok(rest)
            }
        };

        let command = match word {
            "run" | "start" => ConsoleCommand::Compiler(CompilerCommand::Start),
            "stop" => ConsoleCommand::Compiler(CompilerCommand::Stop),
            "changed" => ConsoleCommand::Compiler(CompilerCommand::SourceChanged),
            "restart" => ConsoleCommand::Compiler(CompilerCommand::Restart),
            "mode" => ConsoleCommand::Compiler(CompilerCommand::SwitchMode(
                argument("mode")?.parse::<CompilerMode>()?,
            )),
            "open" => ConsoleCommand::Open(PathBuf::from(argument("open")?)),
            "cd" => ConsoleCommand::ChangeDirectory(PathBuf::from(argument("cd")?)),
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Renders an event for the terminal. Diagnostics use `path:line:column: message`
/// with a 1-based column.
pub fn format_event(event: &CompilerEvent) -> String {
    match event {
        CompilerEvent::Started => "[compiler] started\n".to_string(),
        CompilerEvent::Stopped => "[compiler] stopped\n".to_string(),
        CompilerEvent::CompilationStarted => "[compiler] compiling\n".to_string(),
        CompilerEvent::CompilationFinished => "[compiler] finished\n".to_string(),
        CompilerEvent::DocumentChanged => "[compiler] document updated\n".to_string(),
        CompilerEvent::ErrorReport(report) => {
            let mut out = format!("[compiler] {} error(s)\n", report.diagnostic_count());
            for (path, entries) in report.iter() {
                for entry in entries {
                    out.push_str(&format!(
                        "{}:{}:{}: {}\n",
                        path.display(),
                        entry.line,
                        entry.column + 1,
                        entry.message
                    ));
                }
            }
            out
        }
        CompilerEvent::NewStdout(text) | CompilerEvent::NewStderr(text) => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::core::domain::{DiagnosticEntry, ErrorReport};

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_options() {
        let cli = Cli::try_parse_from([
            "typstwriter-compiler",
            "--mode",
            "live",
            "--dry-run",
            "-l",
            "debug",
            "thesis.typ",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("thesis.typ"));
        assert_eq!(cli.output, None);
        assert_eq!(cli.mode.as_deref(), Some("live"));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.dry_run);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level("CRITICAL"), LevelFilter::ERROR);
        assert_eq!(log_level("ERROR"), LevelFilter::ERROR);
        assert_eq!(log_level("WARNING"), LevelFilter::WARN);
        assert_eq!(log_level("info"), LevelFilter::INFO);
        assert_eq!(log_level("Debug"), LevelFilter::DEBUG);
        assert_eq!(log_level("verbose"), LevelFilter::INFO);
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(
            "run".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Compiler(CompilerCommand::Start))
        );
        assert_eq!(
            "  changed ".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Compiler(CompilerCommand::SourceChanged))
        );
        assert_eq!(
            "mode live".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Compiler(CompilerCommand::SwitchMode(
                CompilerMode::Live
            )))
        );
        assert_eq!(
            "open chapters/intro.typ".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Open(PathBuf::from("chapters/intro.typ")))
        );
        assert_eq!(
            "quit".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Quit)
        );
    }

    #[test]
    fn test_console_errors() {
        assert_eq!(
            "compile".parse::<ConsoleCommand>(),
            Err(ConsoleError::Unknown("compile".to_string()))
        );
        assert_eq!(
            "cd".parse::<ConsoleCommand>(),
            Err(ConsoleError::MissingArgument("cd"))
        );
        assert!(matches!(
            "mode preview".parse::<ConsoleCommand>(),
            Err(ConsoleError::Mode(_))
        ));
    }

    #[test]
    fn test_format_error_report() {
        let mut report = ErrorReport::new();
        report.push(
            PathBuf::from("/work/main.typ"),
            DiagnosticEntry {
                message: "unknown variable: x".to_string(),
                line: 2,
                column: 0,
                underline_length: 1,
            },
        );

        assert_eq!(
            format_event(&CompilerEvent::ErrorReport(report)),
            "[compiler] 1 error(s)\n/work/main.typ:2:1: unknown variable: x\n"
        );
        assert_eq!(
            format_event(&CompilerEvent::NewStderr("raw".to_string())),
            "raw"
        );
    }
}
