//! # Paper Gathering
//!
//! Budgeted, oracle-guided selection of papers to read in full.

pub mod decision;
pub mod gatherer;
pub mod oracle;
pub mod pool;
pub mod scoring;

use async_trait::async_trait;

pub use decision::{DecisionSource, GatherDecision, Priority, SufficiencyVerdict};
pub use gatherer::{
    AdaptiveGatherer, AttemptOutcome, ExternalAttempt, ExternalOutcome, ExternalSearch,
    GatherIteration, GatherOutcome, StopReason,
};
pub use oracle::{DecisionOracle, GatherFocus, LlmDecisionOracle};
pub use pool::{FetchedResource, ResourceCandidate, ResourceOrigin, ResourcePool};

/// Retrieves the full text behind a candidate's locator
#[async_trait]
pub trait PaperFetcher: Send + Sync {
    async fn fetch(&self, candidate: &ResourceCandidate) -> anyhow::Result<String>;
}

/// Resolves a free-text title to a paper with a full-text locator
#[async_trait]
pub trait TitleLookup: Send + Sync {
    async fn lookup_by_title(
        &self,
        title: &str,
        keywords: &[String],
    ) -> anyhow::Result<Option<ResourceCandidate>>;
}
