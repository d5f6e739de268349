//! # Motivation Letter Skill
//!
//! Free-text letter; paragraphs are mapped onto the conventional sections
//! in order.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::{DraftText, LetterSection, MotivationLetter};
use crate::skills::prompts;
use crate::skills::{paper_excerpts, professor_view, prompt_json};
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::{paragraphs, word_count};

const DEFAULT_LETTER: &str = "Motivation letter could not be generated.";

/// Names for the first paragraphs; later ones are "Paragraph N"
pub const SECTION_NAMES: [&str; 6] = [
    "Opening",
    "Academic Background",
    "Research Experience",
    "Research Fit",
    "Program Alignment",
    "Closing",
];

pub struct MotivationLetterSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl MotivationLetterSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    pub async fn run(prompt: String, config: &ModelConfig) -> anyhow::Result<DraftText> {
        run_llm_function!(config, DraftText, prompts::MOTIVATION_LETTER, prompt)
    }
}

pub fn letter_sections(text: &str) -> Vec<LetterSection> {
    paragraphs(text)
        .into_iter()
        .enumerate()
        .map(|(idx, content)| LetterSection {
            name: SECTION_NAMES
                .get(idx)
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("Paragraph {}", idx + 1)),
            content,
        })
        .collect()
}

pub fn build_letter(text: &str) -> MotivationLetter {
    let letter = match text.trim() {
        "" => DEFAULT_LETTER,
        trimmed => trimmed,
    };
    MotivationLetter {
        letter: letter.to_string(),
        word_count: word_count(letter),
        sections: letter_sections(letter),
    }
}

#[async_trait]
impl Stage for MotivationLetterSkill {
    fn id(&self) -> &'static str {
        StageKind::MotivationLetterWriter.id()
    }

    fn name(&self) -> &'static str {
        StageKind::MotivationLetterWriter.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::MotivationLetterWriter.opening_action()
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
            "Write a 600-800 word motivation letter in {}.\n\nPreferred start: {}\nFunding status: {}\n\nApplicant profile:\n{}\n\nProfessor profile:\n{}\n\nFit analysis:\n{}",
            input.writing_language(),
            input.preferred_start,
            input.funding_status.as_str(),
            prompt_json(user),
            prompt_json(&professor),
            prompt_json(fit),
        );
        let excerpts = paper_excerpts(ctx);
        if !excerpts.is_empty() {
            prompt.push_str("\n\nExcerpts from the professor's papers:\n");
            prompt.push_str(&excerpts);
        }
        if !input.posting_content.is_empty() {
            prompt.push_str("\n\nPosition posting:\n");
            prompt.push_str(&input.posting_content);
        }

        progress.send_update("Writing motivation letter...").await?;
        let draft = progress
            .run_cancellable(with_timeout(
                "motivation letter",
                self.llm_timeout,
                Self::run(prompt, &self.config),
            ))
            .await?;

        Ok(StageArtifact::MotivationLetter(build_letter(&draft.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_map_to_named_sections() {
        let text = (1..=8)
            .map(|i| format!("Paragraph body {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let letter = build_letter(&text);

        let names: Vec<_> = letter.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Opening",
                "Academic Background",
                "Research Experience",
                "Research Fit",
                "Program Alignment",
                "Closing",
                "Paragraph 7",
                "Paragraph 8"
            ]
        );
        assert_eq!(letter.sections[6].content, "Paragraph body 7.");
        assert_eq!(letter.word_count, 24);
    }

    #[test]
    fn test_empty_text_uses_default_letter() {
        let letter = build_letter("  \n ");
        assert_eq!(letter.letter, DEFAULT_LETTER);
        assert_eq!(letter.sections.len(), 1);
        assert_eq!(letter.sections[0].name, "Opening");
    }
}
