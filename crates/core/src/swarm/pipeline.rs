//! # Pipeline Stages
//!
//! The fixed stage order and the per-run status table the coordinator
//! advances as stages start, report, finish or fail.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::events::StageStatus;

/// The eight stages of an application run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    CvParser,
    ProfessorResearcher,
    PaperSelector,
    FitAnalyzer,
    EmailWriter,
    CvRecommender,
    MotivationLetterWriter,
    ResearchProposalWriter,
}

impl StageKind {
    pub const ALL: [StageKind; 8] = [
        StageKind::CvParser,
        StageKind::ProfessorResearcher,
        StageKind::PaperSelector,
        StageKind::FitAnalyzer,
        StageKind::EmailWriter,
        StageKind::CvRecommender,
        StageKind::MotivationLetterWriter,
        StageKind::ResearchProposalWriter,
    ];

    /// Key for per-stage model overrides
    pub fn id(&self) -> &'static str {
        match self {
            StageKind::CvParser => "cv_parser",
            StageKind::ProfessorResearcher => "professor_researcher",
            StageKind::PaperSelector => "paper_selector",
            StageKind::FitAnalyzer => "fit_analyzer",
            StageKind::EmailWriter => "email_writer",
            StageKind::CvRecommender => "cv_recommender",
            StageKind::MotivationLetterWriter => "motivation_letter_writer",
            StageKind::ResearchProposalWriter => "research_proposal_writer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::CvParser => "CV Parser",
            StageKind::ProfessorResearcher => "Professor Researcher",
            StageKind::PaperSelector => "Paper Selector",
            StageKind::FitAnalyzer => "Fit Analyzer",
            StageKind::EmailWriter => "Email Writer",
            StageKind::CvRecommender => "CV Recommender",
            StageKind::MotivationLetterWriter => "Motivation Letter Writer",
            StageKind::ResearchProposalWriter => "Research Proposal Writer",
        }
    }

    /// currentAction shown when the stage starts
    pub fn opening_action(&self) -> &'static str {
        match self {
            StageKind::CvParser => "Analyzing CV structure...",
            StageKind::ProfessorResearcher => "Collecting academic profile...",
            StageKind::PaperSelector => "Selecting the most relevant papers...",
            StageKind::FitAnalyzer => "Analyzing applicant-professor fit...",
            StageKind::EmailWriter => "Writing personalized email...",
            StageKind::CvRecommender => "Generating CV recommendations...",
            StageKind::MotivationLetterWriter => "Writing motivation letter...",
            StageKind::ResearchProposalWriter => "Drafting research proposal...",
        }
    }
}

/// Lifecycle of one stage within a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Complete | StageState::Error)
    }
}

/// The per-run status table
#[derive(Debug, Clone)]
pub struct Pipeline {
    statuses: Vec<StageStatus>,
    /// Index of the stage currently allowed to run
    cursor: usize,
    failed: bool,
}

impl Pipeline {
    /// One pending slot per stage name, numbered from 1.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let statuses = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| StageStatus::pending(idx + 1, name))
            .collect();
        Self {
            statuses,
            cursor: 0,
            failed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Index of the current stage
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn start(&mut self, action: &str, elapsed: Duration) -> &StageStatus {
        let status = &mut self.statuses[self.cursor];
        status.state = StageState::Running;
        status.progress = 0;
        status.current_action = action.to_string();
        status.stamp(elapsed);
        status
    }

    /// Replace the running stage's currentAction
    pub fn report(&mut self, action: &str, elapsed: Duration) -> &StageStatus {
        let status = &mut self.statuses[self.cursor];
        status.current_action = action.to_string();
        status.stamp(elapsed);
        status
    }

    /// Mark the current stage complete and advance
    pub fn complete(
        &mut self,
        action: &str,
        output: serde_json::Value,
        elapsed: Duration,
    ) -> &StageStatus {
        let idx = self.cursor;
        let status = &mut self.statuses[idx];
        status.state = StageState::Complete;
        status.progress = 100;
        status.current_action = action.to_string();
        status.output = Some(output);
        status.stamp(elapsed);
        self.cursor += 1;
        &self.statuses[idx]
    }

    /// Mark the current stage failed; nothing after it will run
    pub fn fail(&mut self, error: &str, elapsed: Duration) -> &StageStatus {
        let status = &mut self.statuses[self.cursor];
        status.state = StageState::Error;
        status.error = Some(error.to_string());
        status.stamp(elapsed);
        self.failed = true;
        status
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        self.failed || self.cursor >= self.statuses.len()
    }

    /// Check if pipeline succeeded
    pub fn is_success(&self) -> bool {
        !self.failed && self.cursor >= self.statuses.len()
    }

    pub fn statuses(&self) -> &[StageStatus] {
        &self.statuses
    }

    pub fn into_statuses(self) -> Vec<StageStatus> {
        self.statuses
    }
}
