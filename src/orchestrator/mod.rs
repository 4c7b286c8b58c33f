//! Command orchestrator — commands → validated, retried, announced actions.
//!
//! Commands are processed strictly one at a time in arrival order. A
//! command is finished only after its action has succeeded or exhausted
//! its retries *and* its single feedback announcement has returned, so
//! at most one remote mutation is ever in flight.
//!
//! Every completed command produces exactly one announcement: success,
//! validation error, or final failure. Commands abandoned by shutdown
//! produce none.

pub mod action;
pub mod retry;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::device::{DeviceClient, DeviceError};
use crate::feedback::FeedbackSink;

use action::{Action, ActionKind};
use retry::{Jitter, RandomJitter, RetryError, RetryPolicy, run_with_retry};

/// Inclusive range of accepted target temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempBounds {
    pub min: u8,
    pub max: u8,
}

impl TempBounds {
    fn check(self, value: u8) -> Result<(), CommandError> {
        if value < self.min {
            Err(CommandError::BelowMinimum {
                value,
                min: self.min,
            })
        } else if value > self.max {
            Err(CommandError::AboveMaximum {
                value,
                max: self.max,
            })
        } else {
            Ok(())
        }
    }
}

/// Why a command did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("temperature {value} is below the minimum of {min}")]
    BelowMinimum { value: u8, min: u8 },
    #[error("temperature {value} is above the maximum of {max}")]
    AboveMaximum { value: u8, max: u8 },
    #[error("{operation} failed after {attempts} attempts: {source}")]
    OperationFailed {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: DeviceError,
    },
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl CommandError {
    /// Text announced to the user for this failure. Commands abandoned
    /// at shutdown are not announced.
    pub fn announcement(&self) -> Option<String> {
        match self {
            Self::BelowMinimum { value, min } => {
                Some(format!("{value} degrees is below the minimum of {min}"))
            }
            Self::AboveMaximum { value, max } => {
                Some(format!("{value} degrees is above the maximum of {max}"))
            }
            Self::OperationFailed { operation, .. } => Some(format!("Could not {operation}")),
            Self::Cancelled => None,
        }
    }
}

/// Serial executor for decoded commands.
pub struct Orchestrator {
    device: Arc<dyn DeviceClient>,
    feedback: Arc<dyn FeedbackSink>,
    policy: RetryPolicy,
    bounds: TempBounds,
    jitter: Box<dyn Jitter>,
}

impl Orchestrator {
    pub fn new(
        device: Arc<dyn DeviceClient>,
        feedback: Arc<dyn FeedbackSink>,
        policy: RetryPolicy,
        bounds: TempBounds,
    ) -> Self {
        Self {
            device,
            feedback,
            policy,
            bounds,
            jitter: Box::new(RandomJitter),
        }
    }

    /// Replace the jitter source.
    pub fn with_jitter(mut self, jitter: Box<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Process commands until the channel closes or shutdown fires.
    ///
    /// Commands that arrive while one is being handled wait in the
    /// channel; none are dropped or interleaved.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            if let Err(CommandError::Cancelled) = self.handle(command, &shutdown).await {
                break;
            }
        }
        tracing::info!("orchestrator stopped");
    }

    /// Execute one command and announce its outcome.
    pub async fn handle(
        &mut self,
        command: Command,
        shutdown: &CancellationToken,
    ) -> Result<(), CommandError> {
        tracing::info!(%command, "processing command");

        let result = self.execute(command, shutdown).await;
        let message = match &result {
            Ok(message) => Some(message.clone()),
            Err(e) => {
                let message = e.announcement();
                if message.is_some() {
                    tracing::warn!(%command, error = %e, "command failed");
                } else {
                    tracing::info!(%command, "command abandoned at shutdown");
                }
                message
            }
        };

        if let Some(message) = message {
            self.announce(&message, shutdown).await;
        }
        result.map(|_| ())
    }

    /// Validate, map to an action and run it under the retry policy.
    /// Returns the success announcement.
    async fn execute(
        &mut self,
        command: Command,
        shutdown: &CancellationToken,
    ) -> Result<String, CommandError> {
        let kind = match command {
            Command::SetTemperature(value) => {
                self.bounds.check(value)?;
                ActionKind::SetTemperature(value)
            }
            Command::ToggleOrNot => ActionKind::TogglePower,
            Command::VoiceStatus => ActionKind::ReadStatus,
            Command::PowerOn => ActionKind::PowerOn,
            Command::PowerOff => ActionKind::PowerOff,
        };

        let action = Action::new(kind);
        let device: &dyn DeviceClient = &*self.device;
        let operation = action.to_string();

        let output = run_with_retry(
            &self.policy,
            self.jitter.as_mut(),
            shutdown,
            &operation,
            || action.execute(device),
        )
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => CommandError::OperationFailed {
                operation: kind.label(),
                attempts,
                source: last,
            },
            RetryError::Cancelled => CommandError::Cancelled,
        })?;

        tracing::info!(%action, ?output, "action succeeded");
        Ok(output.announcement())
    }

    async fn announce(&self, message: &str, shutdown: &CancellationToken) {
        tracing::info!(message, "announcing");
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            result = self.feedback.announce(message) => result,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, message, "feedback failed");
        }
    }
}
