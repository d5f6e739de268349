//! # Email Writer Skill
//!
//! Drafts the first-contact email. Word count is always recomputed from the
//! body, and the referenced paper falls back to the fit analysis' choice.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::{EmailDraft, FitAnalysis, PaperLink};
use crate::skills::prompts;
use crate::skills::{professor_view, prompt_json};
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::{dedupe_strings, word_count};

const DEFAULT_SUBJECT: &str = "PhD inquiry regarding your recent research";
const DEFAULT_BODY: &str =
    "Dear Professor, I am writing to express my interest in your research.";

pub struct EmailWriterSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl EmailWriterSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    /// SDK-style call: email draft from a rendered prompt.
    pub async fn run(prompt: String, config: &ModelConfig) -> anyhow::Result<EmailDraft> {
        run_llm_function!(config, EmailDraft, prompts::EMAIL_WRITER, prompt)
    }
}

pub fn repair_email(mut email: EmailDraft, fit: &FitAnalysis) -> EmailDraft {
    email.subject_options = dedupe_strings(&email.subject_options);
    if email.subject_options.is_empty() {
        email.subject_options.push(DEFAULT_SUBJECT.to_string());
    }
    email.body = email.body.trim().to_string();
    if email.body.is_empty() {
        email.body = DEFAULT_BODY.to_string();
    }
    email.word_count = word_count(&email.body);

    let named = email
        .referenced_paper
        .as_ref()
        .is_some_and(|p| !p.title.trim().is_empty());
    if !named {
        let best = &fit.best_paper_to_reference;
        email.referenced_paper = (!best.title.trim().is_empty()).then(|| PaperLink {
            title: best.title.clone(),
            url: best.url.clone(),
        });
    }
    email
}

#[async_trait]
impl Stage for EmailWriterSkill {
    fn id(&self) -> &'static str {
        StageKind::EmailWriter.id()
    }

    fn name(&self) -> &'static str {
        StageKind::EmailWriter.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::EmailWriter.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        let user = ctx.user_profile()?;
        let professor = professor_view(ctx)?;
        let fit = ctx.fit_analysis()?;
        let input = ctx.input();

        let mut prompt = format!(
            "Write the outreach email in {}.\n\nFunding status: {}\nPreferred start: {}\n\nApplicant profile:\n{}\n\nProfessor profile:\n{}\n\nFit analysis:\n{}",
            input.writing_language(),
            input.funding_status.as_str(),
            input.preferred_start,
            prompt_json(user),
            prompt_json(&professor),
            prompt_json(fit),
        );
        if !input.additional_notes.is_empty() {
            prompt.push_str("\n\nApplicant notes:\n");
            prompt.push_str(&input.additional_notes);
        }

        progress.send_update("Drafting email...").await?;
        let email = progress
            .run_cancellable(with_timeout(
                "email drafting",
                self.llm_timeout,
                Self::run(prompt, &self.config),
            ))
            .await?;

        Ok(StageArtifact::Email(repair_email(email, fit)))
    }
}
