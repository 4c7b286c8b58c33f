mod cli;
mod command;
mod config;
mod device;
mod feedback;
mod hotkey;
mod orchestrator;

use std::fmt::Display;

use clap::Parser;
use cli::{Cli, Command, SendAction};
use orchestrator::CommandError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            device,
            policy,
            speech,
            keys,
        } => {
            let table = config::hotkey_table(&keys).unwrap_or_else(|e| fail("run", e));
            let orchestrator =
                config::orchestrator(&device, &policy, &speech).unwrap_or_else(|e| fail("run", e));
            if let Err(e) = hotkey::run(table, orchestrator).await {
                fail("run", e);
            }
        }
        Command::Send {
            action,
            device,
            policy,
            speech,
        } => {
            let mut orchestrator =
                config::orchestrator(&device, &policy, &speech).unwrap_or_else(|e| fail("send", e));

            let shutdown = CancellationToken::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            let command = match action {
                SendAction::Toggle => command::Command::ToggleOrNot,
                SendAction::Status => command::Command::VoiceStatus,
                SendAction::On => command::Command::PowerOn,
                SendAction::Off => command::Command::PowerOff,
                SendAction::Set { temperature } => command::Command::SetTemperature(temperature),
            };
            let result = orchestrator.handle(command, &shutdown).await;
            if let Err(e) = &result {
                eprintln!("climakey send: {e}");
            }
            std::process::exit(send_exit_code(&result));
        }
        Command::Keys { keys } => {
            let table = config::hotkey_table(&keys).unwrap_or_else(|e| fail("keys", e));
            if let Err(e) = hotkey::dump(table).await {
                fail("keys", e);
            }
        }
    }
}

fn fail(mode: &str, error: impl Display) -> ! {
    tracing::error!(error = %error, mode, "failed");
    eprintln!("climakey {mode}: {error}");
    std::process::exit(1);
}

/// Exit status of `send`: 0 when the command succeeded or was cancelled
/// by Ctrl+C, 2 when it completed with an announced failure.
fn send_exit_code(result: &Result<(), CommandError>) -> i32 {
    match result {
        Ok(()) | Err(CommandError::Cancelled) => 0,
        Err(_) => 2,
    }
}
