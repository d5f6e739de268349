//! # Application Skills
//!
//! The eight stages of an application run and the tools they use.
//!
//! ## Architecture
//!
//! ```text
//! Coordinator
//!   └── Stages (impl Stage, one artifact each)
//!         ├── LLM calls (run_llm_function! + defaults/*.md prompts)
//!         └── Tools (academic APIs, web, vision, PDF)
//! ```
//!
//! ## Stages
//!
//! **Evidence:**
//! - `CvParserSkill` - Structured applicant profile from the CV
//! - `ProfessorResearcherSkill` - Professor profile from APIs, web and image
//! - `PaperSelectorSkill` - Adaptive paper gathering plus external search
//!
//! **Writing:**
//! - `FitAnalyzerSkill` - Applicant/professor fit
//! - `EmailWriterSkill` - Outreach email
//! - `CvRecommenderSkill` - CV tailoring advice
//! - `MotivationLetterSkill` - Motivation letter
//! - `ResearchProposalSkill` - Research proposal

pub mod llm_helpers;
pub mod prompts;
pub mod tools;

// Artifact Registry (types passed between stages)
pub mod artifact_registry;

// Evidence
pub mod cv_parser_skill;
pub mod paper_selector_skill;
pub mod professor_researcher_skill;

// Writing
pub mod cv_recommender_skill;
pub mod email_writer_skill;
pub mod fit_analyzer_skill;
pub mod motivation_letter_skill;
pub mod research_proposal_skill;

use serde::Serialize;
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::gather::LlmDecisionOracle;
use crate::swarm::context::RunContext;
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::Stage;
use artifact_registry::ProfessorProfile;
use tools::Toolbox;

pub use cv_parser_skill::CvParserSkill;
pub use cv_recommender_skill::CvRecommenderSkill;
pub use email_writer_skill::EmailWriterSkill;
pub use fit_analyzer_skill::FitAnalyzerSkill;
pub use motivation_letter_skill::MotivationLetterSkill;
pub use paper_selector_skill::PaperSelectorSkill;
pub use professor_researcher_skill::ProfessorResearcherSkill;
pub use research_proposal_skill::ResearchProposalSkill;

/// The eight stages in run order, each with its own model config.
pub fn default_stages(config: &CoordinatorConfig, toolbox: &Toolbox) -> Vec<Box<dyn Stage>> {
    let model = |kind: StageKind| config.model_config(kind.id());
    let llm_timeout = config.timeouts.oracle();

    vec![
        Box::new(CvParserSkill::new(model(StageKind::CvParser), llm_timeout)),
        Box::new(ProfessorResearcherSkill::new(
            model(StageKind::ProfessorResearcher),
            toolbox,
            &config.timeouts,
        )),
        Box::new(PaperSelectorSkill::new(
            Arc::new(LlmDecisionOracle::new(model(StageKind::PaperSelector))),
            toolbox.fetcher.clone(),
            toolbox.academic.clone(),
            config,
        )),
        Box::new(FitAnalyzerSkill::new(model(StageKind::FitAnalyzer), llm_timeout)),
        Box::new(EmailWriterSkill::new(model(StageKind::EmailWriter), llm_timeout)),
        Box::new(CvRecommenderSkill::new(model(StageKind::CvRecommender), llm_timeout)),
        Box::new(MotivationLetterSkill::new(
            model(StageKind::MotivationLetterWriter),
            llm_timeout,
        )),
        Box::new(ResearchProposalSkill::new(
            model(StageKind::ResearchProposalWriter),
            llm_timeout,
        )),
    ]
}

/// Compact JSON for prompt context; unserializable values become `null`.
pub(crate) fn prompt_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// The professor profile as writing stages see it: selected papers first.
pub(crate) fn professor_view(ctx: &RunContext) -> anyhow::Result<ProfessorProfile> {
    let mut profile = ctx.professor_profile()?.clone();
    if let Ok(selection) = ctx.paper_selection() {
        if !selection.ordered_papers.is_empty() {
            profile.recent_papers = selection.ordered_papers.clone();
        }
    }
    Ok(profile)
}

/// Gathered paper excerpts for prompts, empty when nothing was read.
pub(crate) fn paper_excerpts(ctx: &RunContext) -> String {
    let Ok(selection) = ctx.paper_selection() else {
        return String::new();
    };
    selection
        .selected
        .iter()
        .filter(|paper| !paper.excerpt.is_empty())
        .map(|paper| format!("### {}\n{}", paper.paper.title, paper.excerpt))
        .collect::<Vec<_>>()
        .join("\n\n")
}
