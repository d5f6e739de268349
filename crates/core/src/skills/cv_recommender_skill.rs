//! # CV Recommender Skill
//!
//! Suggests how to tailor the CV to this professor. Every list may come back
//! empty.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::CvRecommendations;
use crate::skills::fit_analyzer_skill::normalize_fit;
use crate::skills::prompts;
use crate::skills::{professor_view, prompt_json};
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::{dedupe_strings, truncate_chars};

/// CV characters sent to the model
pub const CV_CONTEXT_CHARS: usize = 10_000;

pub struct CvRecommenderSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl CvRecommenderSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    pub async fn run(prompt: String, config: &ModelConfig) -> anyhow::Result<CvRecommendations> {
        run_llm_function!(config, CvRecommendations, prompts::CV_RECOMMENDER, prompt)
    }
}

/// Drop updates with nothing to suggest and normalize priorities.
pub fn repair_recommendations(mut recs: CvRecommendations) -> CvRecommendations {
    recs.updates.retain(|u| !u.suggested_text.trim().is_empty());
    for update in &mut recs.updates {
        update.priority = normalize_fit(&update.priority);
    }
    recs.keep_as_is.retain(|n| !n.section.trim().is_empty());
    recs.remove_or_deemphasize
        .retain(|n| !n.section.trim().is_empty());
    recs.format_suggestions = dedupe_strings(&recs.format_suggestions);
    recs
}

#[async_trait]
impl Stage for CvRecommenderSkill {
    fn id(&self) -> &'static str {
        StageKind::CvRecommender.id()
    }

    fn name(&self) -> &'static str {
        StageKind::CvRecommender.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::CvRecommender.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        let cv_text = ctx.cv_text()?;
        let professor = professor_view(ctx)?;
        let fit = ctx.fit_analysis()?;

        let prompt = format!(
            "Recommend CV changes for this application.\n\nCV text:\n{}\n\nProfessor profile:\n{}\n\nFit analysis:\n{}",
            truncate_chars(cv_text, CV_CONTEXT_CHARS),
            prompt_json(&professor),
            prompt_json(fit),
        );

        progress.send_update("Reviewing CV against the lab's focus...").await?;
        let recs = progress
            .run_cancellable(with_timeout(
                "CV recommendations",
                self.llm_timeout,
                Self::run(prompt, &self.config),
            ))
            .await?;

        Ok(StageArtifact::CvRecommendations(repair_recommendations(recs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::artifact_registry::{CvUpdate, SectionNote};

    #[test]
    fn test_repair_normalizes_priority_and_drops_empty_entries() {
        let recs = repair_recommendations(CvRecommendations {
            updates: vec![
                CvUpdate {
                    section: "Projects".into(),
                    suggested_text: "Lead with the synthesis project".into(),
                    priority: "URGENT".into(),
                    ..Default::default()
                },
                CvUpdate {
                    section: "Skills".into(),
                    priority: "high".into(),
                    ..Default::default()
                },
            ],
            keep_as_is: vec![SectionNote::default()],
            format_suggestions: vec!["One page".into(), "one page".into()],
            ..Default::default()
        });

        assert_eq!(recs.updates.len(), 1);
        assert_eq!(recs.updates[0].priority, "medium");
        assert!(recs.keep_as_is.is_empty());
        assert_eq!(recs.format_suggestions, vec!["One page"]);
    }

    #[test]
    fn test_empty_recommendations_stay_empty() {
        let recs = repair_recommendations(CvRecommendations::default());
        assert_eq!(recs, CvRecommendations::default());
    }
}
