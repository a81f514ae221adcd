use std::panic;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, ConsoleCommand};
use crate::config::Config;
use crate::constants::COMMAND_TX_ERR;
use crate::core::domain::{CompilerEvent, CompilerMode};
use crate::core::state::{AppState, pdf_path};
use crate::core::supervisor::Supervisor;
use crate::core::traits::process::ProcessSpawner;
use crate::native::process::NativeSpawner;
use crate::stubs::process::ProcessStub;

mod cli;
mod config;
mod constants;
mod core;
mod native;
mod stubs;

#[cfg(all(test, unix))]
mod integration_test;

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli::log_level(&cli.log_level).into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let config = Config::load(cli.config.as_deref())?;
    let working_directory = cli
        .working_dir
        .clone()
        .unwrap_or_else(|| config.working_directory());
    let compiler = cli.compiler.clone().unwrap_or(config.compiler.name);
    let mode = cli.mode.clone().unwrap_or(config.compiler.mode);
    // The compiler runs in the working directory, not in ours.
    let input = std::path::absolute(&cli.input)?;
    let output = match &cli.output {
        Some(output) => std::path::absolute(output)?,
        None => pdf_path(&input),
    };

    let state = Arc::new(AppState::new(
        working_directory,
        mode.parse::<CompilerMode>().unwrap_or_default(),
    ));
    state.set_main_file(Some(input.clone()));

    let spawner: Arc<dyn ProcessSpawner> = if cli.dry_run {
        tracing::info!("Dry run, the compiler is simulated");
        Arc::new(ProcessStub::new(0, "", "", Duration::from_millis(500)))
    } else {
        Arc::new(NativeSpawner::new())
    };

    let supervisor = Supervisor::new(
        compiler,
        spawner,
        state.clone(),
        &mode,
        Some(input),
        Some(output),
    );
    let (handle, task) = supervisor.spawn();
    let printer = tokio::spawn(print_events(handle.events()));

    handle.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(ConsoleCommand::Compiler(command)) => {
                        if let Err(e) = handle.send(command).await {
                            tracing::error!("{}: {}", COMMAND_TX_ERR, e);
                            break;
                        }
                    }
                    Ok(ConsoleCommand::Open(path)) => state.set_main_file(Some(path)),
                    Ok(ConsoleCommand::ChangeDirectory(path)) => state.set_working_directory(path),
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        tracing::debug!("{}", e);
    }
    drop(handle);
    task.await?;
    printer.await?;

    Ok(())
}

/// Prints every event until the supervisor is gone.
async fn print_events(mut events: BroadcastStream<CompilerEvent>) {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                let text = cli::format_event(&event);
                if let Err(e) = stdout.write_all(text.as_bytes()).await {
                    tracing::error!("Failed to print compiler output: {}", e);
                    return;
                }
                let _ = stdout.flush().await;
            }
            Err(e) => tracing::warn!("Missed compiler events: {}", e),
        }
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
