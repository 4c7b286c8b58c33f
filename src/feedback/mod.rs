//! Feedback sink — renders a short message to the user.
//!
//! The orchestrator issues exactly one announcement per completed
//! command. Announcements are never retried; a failure is logged and
//! the next command proceeds.

pub mod speech;

use std::process::ExitStatus;
use std::time::Duration;

use futures::future::BoxFuture;

pub use speech::{SpeechConfig, SpeechSink};

/// Feedback delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("speech process exited with {0}")]
    Exit(ExitStatus),
    #[error("speech process timed out after {0:?}")]
    Timeout(Duration),
    #[error("superseded by a newer announcement")]
    Superseded,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders text audibly (or otherwise) to the user.
///
/// A new announcement issued while one is in flight supersedes it: the
/// older call stops and returns [`FeedbackError::Superseded`].
pub trait FeedbackSink: Send + Sync {
    fn announce<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), FeedbackError>>;
}
