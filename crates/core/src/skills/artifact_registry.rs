//! # Artifact Registry
//!
//! Shared artifact types passed between stages and returned to callers.
//! Serialized in camelCase; types the LLM fills directly also derive
//! `LLMOutput`, with every field defaulted so partial answers still parse.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::gather::{AttemptOutcome, GatherIteration, ResourceCandidate, StopReason};

// ============================================================================
// CV Parser
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub gpa: Option<String>,
    #[serde(default)]
    pub thesis: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub dates: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// first_author or co_author
    #[serde(default)]
    pub role: String,
}

/// Structured applicant profile extracted from the CV
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

// ============================================================================
// Professor Researcher
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorProfile {
    pub name: String,
    pub title: String,
    pub university: String,
    pub department: String,
    pub email: Option<String>,
    /// Page the email was found on
    pub email_source: Option<String>,
    pub research_interests: Vec<String>,
    pub recent_papers: Vec<ResourceCandidate>,
    pub current_projects: Vec<String>,
    pub lab_info: String,
    pub lab_url: Option<String>,
    pub open_positions: Option<String>,
    pub sources: Vec<String>,
}

// ============================================================================
// Paper Selector
// ============================================================================

/// A fetched paper chosen for downstream writing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedPaper {
    #[serde(flatten)]
    pub paper: ResourceCandidate,
    pub selection_reason: String,
    /// Leading part of the extracted full text
    pub excerpt: String,
    pub external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAttemptSummary {
    pub title: String,
    pub resolved_title: Option<String>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSelection {
    pub total_downloaded: usize,
    pub additional_downloaded: usize,
    pub iterations: usize,
    /// Titles of the selected papers, in selection order
    pub papers: Vec<String>,
    pub selected: Vec<SelectedPaper>,
    /// Professor's papers with the selected ones first
    pub ordered_papers: Vec<ResourceCandidate>,
    pub stop_reason: StopReason,
    pub history: Vec<GatherIteration>,
    pub external_attempts: Vec<ExternalAttemptSummary>,
}

// ============================================================================
// Fit Analyzer
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaperReference {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub venue: String,
}

impl From<&ResourceCandidate> for PaperReference {
    fn from(paper: &ResourceCandidate) -> Self {
        Self {
            title: paper.title.clone(),
            year: paper.year,
            abstract_text: paper.abstract_text.clone().unwrap_or_default(),
            url: paper
                .url
                .clone()
                .or_else(|| paper.pdf_url.clone())
                .unwrap_or_default(),
            venue: paper.venue.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FitAnalysis {
    /// high, medium or low
    #[serde(default)]
    pub overall_fit: String,
    #[serde(default)]
    pub key_overlaps: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub best_paper_to_reference: PaperReference,
    #[serde(default)]
    pub suggested_angle: String,
}

// ============================================================================
// Email Writer
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaperLink {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailDraft {
    #[serde(default)]
    pub subject_options: Vec<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub referenced_paper: Option<PaperLink>,
    #[serde(default)]
    pub effectiveness_note: String,
}

// ============================================================================
// CV Recommender
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CvUpdate {
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub current_text: String,
    #[serde(default)]
    pub suggested_text: String,
    #[serde(default)]
    pub reason: String,
    /// high, medium or low
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionNote {
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CvRecommendations {
    #[serde(default)]
    pub updates: Vec<CvUpdate>,
    #[serde(default)]
    pub keep_as_is: Vec<SectionNote>,
    #[serde(default)]
    pub remove_or_deemphasize: Vec<SectionNote>,
    #[serde(default)]
    pub format_suggestions: Vec<String>,
}

// ============================================================================
// Motivation Letter / Research Proposal
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LetterSection {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotivationLetter {
    pub letter: String,
    pub word_count: usize,
    pub sections: Vec<LetterSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSection {
    pub heading: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProposal {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub sections: Vec<ProposalSection>,
    pub references: Vec<String>,
    pub word_count: usize,
}

/// Free-text model answer for the writing stages
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DraftText {
    /// The complete document text
    #[serde(default)]
    pub text: String,
}
