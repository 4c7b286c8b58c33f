//! Text-to-speech sink — one supervised subprocess per announcement.
//!
//! Runs `<program> <args...> <text>` with stdio detached. The process is
//! killed when it outlives the configured timeout, when a newer
//! announcement supersedes it, or when the announcing future is dropped.

use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{FeedbackError, FeedbackSink};

/// Speech subprocess settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Executable, e.g. `espeak` or `say`.
    pub program: String,
    /// Arguments placed before the text.
    pub args: Vec<String>,
    /// Upper bound on a single utterance.
    pub timeout: Duration,
}

/// How a supervised utterance ended.
enum Ending {
    Exited(std::io::Result<std::process::ExitStatus>),
    Superseded,
    TimedOut,
}

/// Subprocess-backed [`FeedbackSink`].
pub struct SpeechSink {
    config: SpeechConfig,
    /// Cancellation handle of the utterance currently speaking, tagged
    /// with a sequence number so a finished call only clears its own slot.
    current: Mutex<Option<(u64, CancellationToken)>>,
    next_seq: AtomicU64,
}

impl SpeechSink {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Cancel whatever is speaking and register a new utterance.
    fn take_slot(&self) -> (u64, CancellationToken) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, previous)) = current.replace((seq, token.clone())) {
            previous.cancel();
        }
        (seq, token)
    }

    fn release_slot(&self, seq: u64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_ref().is_some_and(|(s, _)| *s == seq) {
            *current = None;
        }
    }

    async fn speak(&self, text: &str) -> Result<(), FeedbackError> {
        let (seq, token) = self.take_slot();

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                self.release_slot(seq);
                FeedbackError::Spawn {
                    program: self.config.program.clone(),
                    source,
                }
            })?;

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = token.cancelled() => Ending::Superseded,
            _ = tokio::time::sleep(self.config.timeout) => Ending::TimedOut,
        };
        self.release_slot(seq);

        match ending {
            Ending::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(FeedbackError::Exit(status))
                }
            }
            Ending::Superseded => {
                kill(&mut child).await;
                tracing::debug!("announcement superseded");
                Err(FeedbackError::Superseded)
            }
            Ending::TimedOut => {
                kill(&mut child).await;
                Err(FeedbackError::Timeout(self.config.timeout))
            }
        }
    }
}

/// Kill and reap a child. Errors are logged and otherwise ignored.
async fn kill(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "failed to kill speech process");
    }
}

impl FeedbackSink for SpeechSink {
    fn announce<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), FeedbackError>> {
        self.speak(text).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(program: &str, args: &[&str], timeout: Duration) -> SpeechSink {
        SpeechSink::new(SpeechConfig {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout,
        })
    }

    #[tokio::test]
    async fn text_is_passed_as_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("spoken.txt");
        let script = format!("printf %s \"$0\" > {}", out.display());

        sink("sh", &["-c", &script], Duration::from_secs(5))
            .announce("Temperature set to 22 degrees")
            .await
            .unwrap();

        let spoken = tokio::fs::read_to_string(&out).await.unwrap();
        assert_eq!(spoken, "Temperature set to 22 degrees");
    }

    #[tokio::test]
    async fn non_zero_exit_is_error() {
        let err = sink("false", &[], Duration::from_secs(5))
            .announce("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::Exit(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = sink("climakey-no-such-tts", &[], Duration::from_secs(5))
            .announce("hello")
            .await
            .unwrap_err();
        match err {
            FeedbackError::Spawn { program, .. } => assert_eq!(program, "climakey-no-such-tts"),
            other => panic!("expected Spawn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_process_is_killed_on_timeout() {
        let started = std::time::Instant::now();
        let err = sink("sleep", &[], Duration::from_millis(100))
            .announce("5")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::Timeout(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn newer_announcement_supersedes_older() {
        let sink = sink("sleep", &[], Duration::from_secs(10));

        let first = sink.announce("5");
        let second = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sink.announce("0").await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(FeedbackError::Superseded)), "{first:?}");
        assert!(second.is_ok(), "{second:?}");
        assert!(sink.current.lock().unwrap().is_none());
    }
}
