//! # Run Context
//!
//! State owned by a single run: the validated request and the artifact
//! each completed stage produced. Every artifact slot is written exactly
//! once, by merging the [`StageArtifact`] a stage returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::StageStatus;
use crate::error::PipelineError;
use crate::skills::artifact_registry::{
    CvRecommendations, EmailDraft, FitAnalysis, MotivationLetter, PaperSelection,
    ProfessorProfile, ResearchProposal, UserProfile,
};
use crate::tools::text::dedupe_strings;

pub const DEFAULT_PREFERRED_START: &str = "Fall 2026";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    German,
    French,
    Other,
}

impl Language {
    pub fn parse(value: &str) -> Option<Language> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "english" => Some(Language::English),
            "german" => Some(Language::German),
            "french" => Some(Language::French),
            "other" => Some(Language::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::German => "german",
            Language::French => "french",
            Language::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    #[default]
    FullyFunded,
    PartiallyFunded,
    SelfFunded,
    SeekingFunding,
}

impl FundingStatus {
    pub fn parse(value: &str) -> Option<FundingStatus> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "fully_funded" => Some(FundingStatus::FullyFunded),
            "partially_funded" => Some(FundingStatus::PartiallyFunded),
            "self_funded" => Some(FundingStatus::SelfFunded),
            "seeking_funding" => Some(FundingStatus::SeekingFunding),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FundingStatus::FullyFunded => "fully_funded",
            FundingStatus::PartiallyFunded => "partially_funded",
            FundingStatus::SelfFunded => "self_funded",
            FundingStatus::SeekingFunding => "seeking_funding",
        }
    }
}

/// An uploaded file
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Everything a caller supplies for one run
#[derive(Debug, Clone, Default)]
pub struct ApplicationRequest {
    pub professor_name: String,
    pub university: String,
    pub language: Language,
    pub custom_language: Option<String>,
    pub funding_status: FundingStatus,
    pub research_interests: String,
    pub preferred_start: String,
    pub additional_notes: String,
    pub posting_content: String,
    pub cv: Upload,
    pub context_image: Option<Upload>,
}

impl ApplicationRequest {
    /// Trim text fields, fill defaults and reject unusable input.
    pub fn validate(mut self) -> Result<Self, PipelineError> {
        self.professor_name = self.professor_name.trim().to_string();
        self.university = self.university.trim().to_string();
        if self.professor_name.is_empty() || self.university.is_empty() {
            return Err(PipelineError::InvalidInput(
                "Professor name and university are required".to_string(),
            ));
        }
        if self.cv.bytes.is_empty() {
            return Err(PipelineError::InvalidInput("CV file is empty".to_string()));
        }

        self.custom_language = self
            .custom_language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        self.research_interests = self.research_interests.trim().to_string();
        self.preferred_start = match self.preferred_start.trim() {
            "" => DEFAULT_PREFERRED_START.to_string(),
            start => start.to_string(),
        };
        self.additional_notes = self.additional_notes.trim().to_string();
        self.posting_content = self.posting_content.trim().to_string();
        self.context_image = self.context_image.filter(|image| !image.bytes.is_empty());
        Ok(self)
    }

    /// Language the documents should be written in
    pub fn writing_language(&self) -> &str {
        self.custom_language
            .as_deref()
            .unwrap_or_else(|| self.language.as_str())
    }
}

/// What one stage hands back to the coordinator
#[derive(Debug, Clone)]
pub enum StageArtifact {
    CvProfile {
        cv_text: String,
        profile: UserProfile,
    },
    ProfessorResearch {
        profile: ProfessorProfile,
        web_steps_used: usize,
        image_context_used: bool,
        sources: Vec<String>,
    },
    PaperSelection(PaperSelection),
    FitAnalysis(FitAnalysis),
    Email(EmailDraft),
    CvRecommendations(CvRecommendations),
    MotivationLetter(MotivationLetter),
    ResearchProposal(ResearchProposal),
}

impl StageArtifact {
    /// Final currentAction for the completed stage
    pub fn summary(&self) -> String {
        match self {
            StageArtifact::CvProfile { profile, .. } => {
                format!("Extracted profile for {}", profile.name)
            }
            StageArtifact::ProfessorResearch { profile, .. } => {
                format!("Collected {} papers", profile.recent_papers.len())
            }
            StageArtifact::PaperSelection(selection) => {
                format!("Selected {} papers", selection.papers.len())
            }
            StageArtifact::FitAnalysis(fit) => format!("Fit: {}", fit.overall_fit),
            StageArtifact::Email(email) => format!("{} words", email.word_count),
            StageArtifact::CvRecommendations(recs) => {
                format!("{} updates suggested", recs.updates.len())
            }
            StageArtifact::MotivationLetter(letter) => format!("{} words", letter.word_count),
            StageArtifact::ResearchProposal(proposal) => {
                format!("{} words", proposal.word_count)
            }
        }
    }

    /// Output snapshot attached to the completed status
    pub fn snapshot(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            StageArtifact::CvProfile { profile, .. } => serde_json::to_value(profile),
            StageArtifact::ProfessorResearch { profile, .. } => serde_json::to_value(profile),
            StageArtifact::PaperSelection(selection) => Ok(serde_json::json!({
                "totalDownloaded": selection.total_downloaded,
                "additionalDownloaded": selection.additional_downloaded,
                "iterations": selection.iterations,
                "papers": selection.papers,
                "stopReason": selection.stop_reason,
            })),
            StageArtifact::FitAnalysis(fit) => serde_json::to_value(fit),
            StageArtifact::Email(email) => serde_json::to_value(email),
            StageArtifact::CvRecommendations(recs) => serde_json::to_value(recs),
            StageArtifact::MotivationLetter(letter) => serde_json::to_value(letter),
            StageArtifact::ResearchProposal(proposal) => serde_json::to_value(proposal),
        }
    }
}

/// Provenance and usage counters for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub web_steps_used: usize,
    pub image_context_used: bool,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &'static str) -> Result<(), PipelineError> {
    if slot.is_some() {
        return Err(PipelineError::ArtifactAlreadySet(name));
    }
    *slot = Some(value);
    Ok(())
}

#[derive(Debug)]
pub struct RunContext {
    input: ApplicationRequest,
    cv_text: Option<String>,
    user_profile: Option<UserProfile>,
    professor_profile: Option<ProfessorProfile>,
    paper_selection: Option<PaperSelection>,
    fit_analysis: Option<FitAnalysis>,
    email: Option<EmailDraft>,
    cv_recommendations: Option<CvRecommendations>,
    motivation_letter: Option<MotivationLetter>,
    research_proposal: Option<ResearchProposal>,
    meta: RunMeta,
}

impl RunContext {
    pub fn new(input: ApplicationRequest) -> Self {
        Self {
            input,
            cv_text: None,
            user_profile: None,
            professor_profile: None,
            paper_selection: None,
            fit_analysis: None,
            email: None,
            cv_recommendations: None,
            motivation_letter: None,
            research_proposal: None,
            meta: RunMeta::default(),
        }
    }

    pub fn input(&self) -> &ApplicationRequest {
        &self.input
    }

    pub fn meta(&self) -> &RunMeta {
        &self.meta
    }

    pub fn cv_text(&self) -> Result<&str, PipelineError> {
        self.cv_text
            .as_deref()
            .ok_or(PipelineError::MissingArtifact("cvText"))
    }

    pub fn user_profile(&self) -> Result<&UserProfile, PipelineError> {
        self.user_profile
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("userProfile"))
    }

    pub fn professor_profile(&self) -> Result<&ProfessorProfile, PipelineError> {
        self.professor_profile
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("professorProfile"))
    }

    pub fn paper_selection(&self) -> Result<&PaperSelection, PipelineError> {
        self.paper_selection
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("paperSelection"))
    }

    pub fn fit_analysis(&self) -> Result<&FitAnalysis, PipelineError> {
        self.fit_analysis
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("fitAnalysis"))
    }

    pub fn email(&self) -> Result<&EmailDraft, PipelineError> {
        self.email
            .as_ref()
            .ok_or(PipelineError::MissingArtifact("email"))
    }

    /// Merge a stage's artifact; every slot accepts one write.
    pub fn merge(&mut self, artifact: StageArtifact) -> Result<(), PipelineError> {
        match artifact {
            StageArtifact::CvProfile { cv_text, profile } => {
                if self.user_profile.is_some() {
                    return Err(PipelineError::ArtifactAlreadySet("userProfile"));
                }
                set_once(&mut self.cv_text, cv_text, "cvText")?;
                set_once(&mut self.user_profile, profile, "userProfile")
            }
            StageArtifact::ProfessorResearch {
                profile,
                web_steps_used,
                image_context_used,
                sources,
            } => {
                set_once(&mut self.professor_profile, profile, "professorProfile")?;
                self.meta.web_steps_used = web_steps_used;
                self.meta.image_context_used = image_context_used;
                self.meta.sources = dedupe_strings(self.meta.sources.iter().chain(&sources));
                Ok(())
            }
            StageArtifact::PaperSelection(selection) => {
                set_once(&mut self.paper_selection, selection, "paperSelection")
            }
            StageArtifact::FitAnalysis(fit) => set_once(&mut self.fit_analysis, fit, "fitAnalysis"),
            StageArtifact::Email(email) => set_once(&mut self.email, email, "email"),
            StageArtifact::CvRecommendations(recs) => {
                set_once(&mut self.cv_recommendations, recs, "cvRecommendations")
            }
            StageArtifact::MotivationLetter(letter) => {
                set_once(&mut self.motivation_letter, letter, "motivationLetter")
            }
            StageArtifact::ResearchProposal(proposal) => {
                set_once(&mut self.research_proposal, proposal, "researchProposal")
            }
        }
    }

    /// Close the run. Outputs of stages that never completed stay `None`.
    pub fn into_result(
        self,
        error: Option<String>,
        stages: Vec<StageStatus>,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        let mut meta = self.meta;
        if let Some(profile) = &self.professor_profile {
            meta.sources = dedupe_strings(profile.sources.iter().chain(&meta.sources));
        }
        let mut professor_profile = self.professor_profile;
        if let (Some(profile), Some(selection)) = (&mut professor_profile, &self.paper_selection) {
            if !selection.ordered_papers.is_empty() {
                profile.recent_papers = selection.ordered_papers.clone();
            }
        }
        meta.started_at = Some(started_at);
        meta.finished_at = Some(Utc::now());

        RunResult {
            success: error.is_none(),
            email: self.email,
            cv_recommendations: self.cv_recommendations,
            motivation_letter: self.motivation_letter,
            research_proposal: self.research_proposal,
            professor_profile,
            fit_analysis: self.fit_analysis,
            user_profile: self.user_profile,
            paper_selection: self.paper_selection,
            error,
            meta,
            stages,
        }
    }
}

/// Terminal artifact of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub email: Option<EmailDraft>,
    pub cv_recommendations: Option<CvRecommendations>,
    pub motivation_letter: Option<MotivationLetter>,
    pub research_proposal: Option<ResearchProposal>,
    pub professor_profile: Option<ProfessorProfile>,
    pub fit_analysis: Option<FitAnalysis>,
    pub user_profile: Option<UserProfile>,
    pub paper_selection: Option<PaperSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub meta: RunMeta,
    /// Final status of every stage slot
    pub stages: Vec<StageStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApplicationRequest {
        ApplicationRequest {
            professor_name: "  Ada Lovelace ".to_string(),
            university: "University of London".to_string(),
            cv: Upload {
                bytes: b"%PDF-1.4".to_vec(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_trims_and_defaults() {
        let mut input = request();
        input.custom_language = Some("  ".to_string());
        input.context_image = Some(Upload::default());
        let input = input.validate().unwrap();

        assert_eq!(input.professor_name, "Ada Lovelace");
        assert_eq!(input.preferred_start, DEFAULT_PREFERRED_START);
        assert!(input.custom_language.is_none());
        assert!(input.context_image.is_none());
        assert_eq!(input.writing_language(), "english");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut input = request();
        input.university = " ".to_string();
        assert!(matches!(
            input.validate(),
            Err(PipelineError::InvalidInput(_))
        ));

        let mut input = request();
        input.cv.bytes.clear();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_merge_is_write_once() {
        let mut ctx = RunContext::new(request());
        assert!(matches!(
            ctx.user_profile(),
            Err(PipelineError::MissingArtifact("userProfile"))
        ));

        let artifact = StageArtifact::CvProfile {
            cv_text: "cv".to_string(),
            profile: UserProfile::default(),
        };
        ctx.merge(artifact.clone()).unwrap();
        assert_eq!(ctx.cv_text().unwrap(), "cv");
        assert!(matches!(
            ctx.merge(artifact),
            Err(PipelineError::ArtifactAlreadySet("userProfile"))
        ));
    }

    #[test]
    fn test_partial_result_keeps_only_completed_outputs() {
        let mut ctx = RunContext::new(request());
        ctx.merge(StageArtifact::FitAnalysis(FitAnalysis {
            overall_fit: "high".to_string(),
            ..Default::default()
        }))
        .unwrap();

        let result = ctx.into_result(Some("Email Writer failed".to_string()), Vec::new(), Utc::now());
        assert!(!result.success);
        assert!(result.fit_analysis.is_some());
        assert!(result.email.is_none());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"], "Email Writer failed");
        assert!(value["email"].is_null());
    }

    #[test]
    fn test_language_and_funding_parse() {
        assert_eq!(Language::parse("German"), Some(Language::German));
        assert_eq!(Language::parse("klingon"), None);
        assert_eq!(
            FundingStatus::parse("seeking_funding"),
            Some(FundingStatus::SeekingFunding)
        );
    }
}
