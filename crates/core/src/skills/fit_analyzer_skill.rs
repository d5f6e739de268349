//! # Fit Analyzer Skill
//!
//! Compares the applicant with the professor, grounded in the papers the
//! selector actually read.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::{FitAnalysis, PaperReference, ProfessorProfile};
use crate::skills::prompts;
use crate::skills::{paper_excerpts, professor_view, prompt_json};
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::dedupe_strings;

const DEFAULT_FIT: &str = "medium";
const DEFAULT_OVERLAP: &str = "Research alignment identified.";
const DEFAULT_PAPER_TITLE: &str = "Recent research paper";
const DEFAULT_ANGLE: &str = "Applicant background aligns with current lab direction.";

pub struct FitAnalyzerSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl FitAnalyzerSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    /// SDK-style call: fit analysis from a rendered prompt.
    pub async fn run(prompt: String, config: &ModelConfig) -> anyhow::Result<FitAnalysis> {
        run_llm_function!(config, FitAnalysis, prompts::FIT_ANALYZER, prompt)
    }
}

/// Lowercase high/medium/low; anything else is medium.
pub fn normalize_fit(value: &str) -> String {
    match value.trim().to_ascii_lowercase().as_str() {
        fit @ ("high" | "medium" | "low") => fit.to_string(),
        _ => DEFAULT_FIT.to_string(),
    }
}

/// Fill what the model left out. The best paper falls back to the first
/// paper the professor is known for.
pub fn repair_fit(mut fit: FitAnalysis, professor: &ProfessorProfile) -> FitAnalysis {
    fit.overall_fit = normalize_fit(&fit.overall_fit);
    fit.key_overlaps = dedupe_strings(&fit.key_overlaps);
    if fit.key_overlaps.is_empty() {
        fit.key_overlaps.push(DEFAULT_OVERLAP.to_string());
    }
    fit.gaps = dedupe_strings(&fit.gaps);

    if fit.best_paper_to_reference.title.trim().is_empty() {
        fit.best_paper_to_reference = professor
            .recent_papers
            .first()
            .map(PaperReference::from)
            .unwrap_or_else(|| PaperReference {
                title: DEFAULT_PAPER_TITLE.to_string(),
                ..Default::default()
            });
    }
    if fit.suggested_angle.trim().is_empty() {
        fit.suggested_angle = DEFAULT_ANGLE.to_string();
    }
    fit
}

#[async_trait]
impl Stage for FitAnalyzerSkill {
    fn id(&self) -> &'static str {
        StageKind::FitAnalyzer.id()
    }

    fn name(&self) -> &'static str {
        StageKind::FitAnalyzer.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::FitAnalyzer.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        let user = ctx.user_profile()?;
        let professor = professor_view(ctx)?;
        let input = ctx.input();

        let excerpts = paper_excerpts(ctx);
        let mut prompt = format!(
            "Analyze the research fit.\n\nApplicant profile:\n{}\n\nApplicant research interests: {}\n\nProfessor profile:\n{}",
            prompt_json(user),
            input.research_interests,
            prompt_json(&professor),
        );
        if !excerpts.is_empty() {
            prompt.push_str("\n\nExcerpts from the professor's papers:\n");
            prompt.push_str(&excerpts);
        }
        if !input.posting_content.is_empty() {
            prompt.push_str("\n\nPosition posting:\n");
            prompt.push_str(&input.posting_content);
        }

        progress.send_update("Comparing research profiles...").await?;
        let fit = progress
            .run_cancellable(with_timeout(
                "fit analysis",
                self.llm_timeout,
                Self::run(prompt, &self.config),
            ))
            .await?;

        Ok(StageArtifact::FitAnalysis(repair_fit(fit, &professor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::{paper, professor};

    #[test]
    fn test_normalize_fit() {
        assert_eq!(normalize_fit(" HIGH "), "high");
        assert_eq!(normalize_fit("low"), "low");
        assert_eq!(normalize_fit("excellent"), "medium");
        assert_eq!(normalize_fit(""), "medium");
    }

    #[test]
    fn test_repair_fills_defaults_from_professor() {
        let prof = professor(vec![paper("Sketch of the Engine", true)]);
        let fit = repair_fit(FitAnalysis::default(), &prof);

        assert_eq!(fit.overall_fit, "medium");
        assert_eq!(fit.key_overlaps, vec![DEFAULT_OVERLAP]);
        assert_eq!(fit.best_paper_to_reference.title, "Sketch of the Engine");
        assert_eq!(fit.suggested_angle, DEFAULT_ANGLE);
    }

    #[test]
    fn test_repair_without_papers_uses_placeholder() {
        let fit = repair_fit(
            FitAnalysis {
                overall_fit: "High".into(),
                key_overlaps: vec!["synthesis".into(), "Synthesis".into()],
                ..Default::default()
            },
            &professor(Vec::new()),
        );
        assert_eq!(fit.overall_fit, "high");
        assert_eq!(fit.key_overlaps, vec!["synthesis"]);
        assert_eq!(fit.best_paper_to_reference.title, DEFAULT_PAPER_TITLE);
    }
}
