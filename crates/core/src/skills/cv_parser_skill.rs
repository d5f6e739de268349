//! # CV Parser Skill
//!
//! Extracts the CV text from the uploaded PDF and asks the LLM for a
//! structured [`UserProfile`].

use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::UserProfile;
use crate::skills::prompts;
use crate::skills::tools::pdf_text::extract_pdf_text_blocking;
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::{dedupe_strings, truncate_chars};

/// CV characters sent to the model
pub const CV_PROMPT_CHARS: usize = 12_000;

const DEFAULT_APPLICANT_NAME: &str = "Applicant";
const DEFAULT_SUMMARY: &str = "PhD applicant profile extracted from CV.";

pub struct CvParserSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl CvParserSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    /// SDK-style call: structured profile from CV text.
    pub async fn run(cv_text: &str, config: &ModelConfig) -> anyhow::Result<UserProfile> {
        let prompt = format!(
            "Extract structured profile data from this CV text.\n\nCV:\n{}",
            truncate_chars(cv_text, CV_PROMPT_CHARS)
        );
        run_llm_function!(config, UserProfile, prompts::CV_PARSER, prompt)
    }
}

/// Fill what the model left blank.
pub fn repair_profile(mut profile: UserProfile) -> UserProfile {
    profile.name = profile.name.trim().to_string();
    if profile.name.is_empty() {
        profile.name = DEFAULT_APPLICANT_NAME.to_string();
    }
    if profile.summary.trim().is_empty() {
        profile.summary = DEFAULT_SUMMARY.to_string();
    }
    profile.skills = dedupe_strings(&profile.skills);
    profile.education.retain(|e| !e.degree.trim().is_empty() || !e.institution.trim().is_empty());
    profile.publications.retain(|p| !p.title.trim().is_empty());
    profile
}

#[async_trait]
impl Stage for CvParserSkill {
    fn id(&self) -> &'static str {
        StageKind::CvParser.id()
    }

    fn name(&self) -> &'static str {
        StageKind::CvParser.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::CvParser.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        progress.send_update("Extracting text from CV...").await?;
        let cv_text = extract_pdf_text_blocking(ctx.input().cv.bytes.clone())
            .await
            .context("Could not extract text from CV PDF")?;
        tracing::debug!(chars = cv_text.len(), "CV text extracted");

        progress.send_update("Extracting structured profile...").await?;
        let profile = progress
            .run_cancellable(with_timeout(
                "CV parsing",
                self.llm_timeout,
                Self::run(&cv_text, &self.config),
            ))
            .await?;

        Ok(StageArtifact::CvProfile {
            cv_text,
            profile: repair_profile(profile),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::artifact_registry::{Education, Publication};

    #[test]
    fn test_repair_fills_missing_name_and_summary() {
        let profile = repair_profile(UserProfile {
            name: "  ".to_string(),
            skills: vec!["Rust".into(), "rust".into(), "".into(), "PyTorch".into()],
            education: vec![Education::default()],
            publications: vec![Publication {
                title: "Real Paper".into(),
                ..Default::default()
            }],
            ..Default::default()
        });

        assert_eq!(profile.name, "Applicant");
        assert_eq!(profile.summary, DEFAULT_SUMMARY);
        assert_eq!(profile.skills, vec!["Rust", "PyTorch"]);
        assert!(profile.education.is_empty());
        assert_eq!(profile.publications.len(), 1);
    }
}
