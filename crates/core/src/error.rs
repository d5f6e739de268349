//! Error taxonomy for pipeline runs.
//!
//! Recoverable conditions (malformed oracle output, unmatched recommendations,
//! single fetch failures) are absorbed where they occur and never reach this
//! type. What remains here makes a stage's artifact meaningless or stops a run.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage read an artifact that no earlier stage produced
    #[error("required artifact '{0}' has not been produced by an earlier stage")]
    MissingArtifact(&'static str),

    /// A second write to a run-context field
    #[error("artifact '{0}' was already merged into the run context")]
    ArtifactAlreadySet(&'static str),

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("run cancelled")]
    Cancelled,

    /// The decision oracle or a content LLM could not be reached
    #[error("oracle call failed: {0}")]
    Oracle(String),

    #[error("fetch failed for {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    EmptyDocument(String),
}

impl PipelineError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn fetch(locator: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }
}

/// Await `fut` for at most `after`, mapping expiry to [`PipelineError::Timeout`].
pub async fn with_timeout<T, F>(what: &str, after: Duration, fut: F) -> anyhow::Result<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::timeout(what, after).into()),
    }
}
