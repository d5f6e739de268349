//! # Decision Oracle
//!
//! The judgment calls of the gathering loops: what to fetch next, whether
//! the fetched set is enough, and which outside titles to look up. The
//! trait keeps the loops testable with scripted oracles; production uses
//! [`LlmDecisionOracle`].

use async_trait::async_trait;
use serde::Serialize;

use super::decision::{RawExternalSuggestion, RawGatherDecision, RawSufficiency};
use super::gatherer::ExternalAttempt;
use super::pool::{FetchedResource, ResourceCandidate};
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::prompts;
use crate::tools::text::truncate_chars;

const ABSTRACT_PREVIEW_CHARS: usize = 400;
const CONTENT_PREVIEW_CHARS: usize = 1200;

/// What the gathered papers are for
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherFocus {
    pub applicant_interests: String,
    pub applicant_summary: String,
    pub professor_name: String,
    pub professor_interests: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBrief {
    pub title: String,
    pub year: Option<i32>,
    pub citation_count: Option<u64>,
    pub venue: Option<String>,
    pub has_full_text: bool,
    pub abstract_preview: String,
}

impl From<&ResourceCandidate> for CandidateBrief {
    fn from(candidate: &ResourceCandidate) -> Self {
        Self {
            title: candidate.title.clone(),
            year: candidate.year,
            citation_count: candidate.citation_count,
            venue: candidate.venue.clone(),
            has_full_text: candidate.is_fetchable(),
            abstract_preview: truncate_chars(
                candidate.abstract_text.as_deref().unwrap_or_default(),
                ABSTRACT_PREVIEW_CHARS,
            )
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedBrief {
    pub title: String,
    pub excerpt: String,
}

impl From<&FetchedResource> for FetchedBrief {
    fn from(resource: &FetchedResource) -> Self {
        Self {
            title: resource.candidate.title.clone(),
            excerpt: truncate_chars(&resource.content, CONTENT_PREVIEW_CHARS).to_string(),
        }
    }
}

/// Input to [`DecisionOracle::decide`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub focus: GatherFocus,
    pub iteration: usize,
    pub max_iterations: usize,
    pub remaining_slots: usize,
    pub fetched_titles: Vec<String>,
    pub candidates: Vec<CandidateBrief>,
}

/// Input to [`DecisionOracle::assess_sufficiency`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SufficiencyRequest {
    pub focus: GatherFocus,
    pub iteration: usize,
    pub remaining_slots: usize,
    pub fetched: Vec<FetchedBrief>,
}

/// Input to [`DecisionOracle::suggest_external`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRequest {
    pub focus: GatherFocus,
    pub iteration: usize,
    pub remaining_slots: usize,
    pub known_titles: Vec<String>,
    pub search_hints: Vec<String>,
    /// Every earlier attempt and its outcome
    pub previous_attempts: Vec<ExternalAttempt>,
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<RawGatherDecision>;

    async fn assess_sufficiency(
        &self,
        request: &SufficiencyRequest,
    ) -> anyhow::Result<RawSufficiency>;

    async fn suggest_external(
        &self,
        request: &ExternalRequest,
    ) -> anyhow::Result<RawExternalSuggestion>;
}

/// Oracle backed by the configured LLM provider
pub struct LlmDecisionOracle {
    config: ModelConfig,
}

impl LlmDecisionOracle {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

fn render<T: Serialize>(task: &str, request: &T) -> anyhow::Result<String> {
    Ok(format!(
        "{}\n\nState:\n{}",
        task,
        serde_json::to_string_pretty(request)?
    ))
}

#[async_trait]
impl DecisionOracle for LlmDecisionOracle {
    async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<RawGatherDecision> {
        let prompt = render(
            &format!(
                "Iteration {} of {}. Choose at most {} papers to fetch next.",
                request.iteration, request.max_iterations, request.remaining_slots
            ),
            request,
        )?;
        run_llm_function!(
            &self.config,
            RawGatherDecision,
            prompts::PAPER_DECISION,
            prompt
        )
    }

    async fn assess_sufficiency(
        &self,
        request: &SufficiencyRequest,
    ) -> anyhow::Result<RawSufficiency> {
        let prompt = render(
            "Decide whether the fetched papers are enough to write a specific, well-grounded application.",
            request,
        )?;
        run_llm_function!(
            &self.config,
            RawSufficiency,
            prompts::PAPER_SUFFICIENCY,
            prompt
        )
    }

    async fn suggest_external(
        &self,
        request: &ExternalRequest,
    ) -> anyhow::Result<RawExternalSuggestion> {
        let prompt = render(
            &format!(
                "Suggest up to {} papers by exact title that are not already known.",
                request.remaining_slots
            ),
            request,
        )?;
        run_llm_function!(
            &self.config,
            RawExternalSuggestion,
            prompts::EXTERNAL_PAPER_SEARCH,
            prompt
        )
    }
}
