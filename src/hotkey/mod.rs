//! Hotkey daemon — raw X11 key events in, decoded commands out.
//!
//! The X11 source runs on its own thread and forwards raw key events.
//! The decoder turns them into commands, which are queued on a bounded
//! channel to the orchestrator task. A full queue holds back decoding,
//! never shutdown.

pub mod decoder;
pub mod keybinding;
mod x11;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal::unix::{SignalKind, signal as tokio_signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;
use decoder::{Decoder, RawKeyEvent};
use keybinding::HotkeyTable;
use x11::X11Source;

/// Commands buffered between the decoder and the orchestrator.
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Hotkey daemon errors.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("X11: {0}")]
    X11(String),
    #[error("invalid key binding: {0}")]
    InvalidBinding(String),
    #[error("X11 event thread exited unexpectedly")]
    SourceDied,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the hotkey daemon until SIGINT/SIGTERM.
pub async fn run(table: HotkeyTable, orchestrator: Orchestrator) -> Result<(), HotkeyError> {
    let mut sig_term = tokio_signal(SignalKind::terminate())?;
    let mut sig_int = tokio_signal(SignalKind::interrupt())?;

    let source = X11Source::connect()?;
    tracing::info!(screen = source.screen_num(), "connected to X11 display");

    for (binding, command) in table.bindings() {
        tracing::info!(binding = %binding.raw, %command, "hotkey bound");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let (events, x11_thread) = source.spawn_event_thread(Arc::clone(&stop))?;

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = sig_term.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = sig_int.recv() => tracing::info!("received SIGINT, shutting down"),
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        }
    });

    tracing::info!("hotkey daemon running — press Ctrl+C to stop");

    let result = run_loop(events, Decoder::new(table), orchestrator, shutdown).await;

    stop.store(true, Ordering::Relaxed);
    if let Err(e) = signals.await {
        tracing::warn!(error = %e, "signal task failed");
    }
    // Exits within one poll timeout.
    if let Err(e) = x11_thread.join() {
        tracing::warn!("X11 event thread panicked: {e:?}");
    }

    tracing::info!("hotkey daemon stopped");
    result
}

/// Decode `events` and feed the orchestrator until `shutdown` fires or
/// the event source goes away.
///
/// On exit the token is cancelled, which abandons whatever the
/// orchestrator is doing, and the orchestrator task is awaited.
async fn run_loop(
    mut events: mpsc::UnboundedReceiver<RawKeyEvent>,
    mut decoder: Decoder,
    orchestrator: Orchestrator,
    shutdown: CancellationToken,
) -> Result<(), HotkeyError> {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let worker = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    let result = loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            event = events.recv() => event,
        };
        let Some(event) = event else {
            tracing::error!("X11 event thread died — shutting down");
            break Err(HotkeyError::SourceDied);
        };

        tracing::trace!(key = %event.key, action = %event.action, "raw key");
        let Some(command) = decoder.handle(&event) else {
            continue;
        };
        tracing::info!(%command, "decoded");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            sent = tx.send(command) => {
                if sent.is_err() {
                    tracing::error!("orchestrator stopped — shutting down");
                    break Ok(());
                }
            }
        }
    };

    shutdown.cancel();
    drop(tx);
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "orchestrator task failed");
    }
    result
}

/// Print raw key events and the commands they decode to, without
/// executing anything. Runs until Ctrl+C.
pub async fn dump(table: HotkeyTable) -> Result<(), HotkeyError> {
    let source = X11Source::connect()?;
    let stop = Arc::new(AtomicBool::new(false));
    let (mut events, x11_thread) = source.spawn_event_thread(Arc::clone(&stop))?;

    let mut decoder = Decoder::new(table);
    eprintln!("listening for keys — press Ctrl+C to stop");

    let result = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(HotkeyError::SourceDied);
                };
                let command = decoder.handle(&event);
                let digits = decoder.pending_digits();
                match command {
                    Some(command) => println!("{:<4} {:<16} -> {command}", event.action, event.key),
                    None if !digits.is_empty() => {
                        println!("{:<4} {:<16}    digits {digits:?}", event.action, event.key)
                    }
                    None => println!("{:<4} {}", event.action, event.key),
                }
            }

            signal = tokio::signal::ctrl_c() => {
                break signal.map_err(HotkeyError::from);
            }
        }
    };

    stop.store(true, Ordering::Relaxed);
    if let Err(e) = x11_thread.join() {
        tracing::warn!("X11 event thread panicked: {e:?}");
    }
    result
}
