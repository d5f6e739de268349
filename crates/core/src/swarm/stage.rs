//! # Stage Contract
//!
//! A stage reads the run context, reports progress over a channel and
//! returns one artifact. The coordinator is the single consumer of every
//! progress channel, so notices arrive in the order they were sent.

use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::context::{RunContext, StageArtifact};
use crate::error::PipelineError;

/// Progress sink handed to a running stage
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<String>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// A sender plus the receiver the coordinator drains
    pub fn channel(cancel: CancellationToken, buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx, cancel), rx)
    }

    /// Push a notice; becomes the stage's currentAction.
    pub async fn send_update(&self, message: impl Into<String>) -> Result<(), PipelineError> {
        self.ensure_live()?;
        self.tx
            .send(message.into())
            .await
            .map_err(|_| PipelineError::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Await `fut` unless the run is cancelled first.
    pub async fn run_cancellable<T, F>(&self, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled.into()),
            result = fut => result,
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    /// Key for per-stage configuration
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// currentAction when the stage starts
    fn opening_action(&self) -> &'static str {
        "Working..."
    }

    /// Produce this stage's artifact. Reads only artifacts of earlier stages.
    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let (progress, mut rx) = ProgressSender::channel(CancellationToken::new(), 8);
        progress.send_update("one").await.unwrap();
        progress.send_update(String::from("two")).await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_cancelled_sender_refuses_updates() {
        let token = CancellationToken::new();
        let (progress, _rx) = ProgressSender::channel(token.clone(), 8);
        token.cancel();

        assert!(matches!(
            progress.send_update("late").await,
            Err(PipelineError::Cancelled)
        ));
        let result: anyhow::Result<()> = progress
            .run_cancellable(std::future::pending())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_reads_as_cancelled() {
        let (progress, rx) = ProgressSender::channel(CancellationToken::new(), 8);
        drop(rx);
        assert!(progress.send_update("nobody listening").await.is_err());
    }
}
