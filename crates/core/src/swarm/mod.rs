//! # Swarm Orchestration
//!
//! Coordinates the application pipeline.
//!
//! ## Pipeline Flow
//!
//! ```text
//! CV Parser → Professor Researcher → Paper Selector → Fit Analyzer
//!   → Email Writer → CV Recommender → Motivation Letter → Research Proposal
//! ```

pub mod context;
pub mod coordinator;
pub mod events;
pub mod pipeline;
pub mod stage;

pub use context::{
    ApplicationRequest, FundingStatus, Language, RunContext, RunMeta, RunResult, StageArtifact,
    Upload,
};
pub use coordinator::Coordinator;
pub use events::{PipelineEvent, RunClock, StageStatus};
pub use pipeline::{Pipeline, StageKind, StageState};
pub use stage::{ProgressSender, Stage};
