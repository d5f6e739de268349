//! # Research Proposal Skill
//!
//! Markdown proposal, parsed into title, abstract, sections and references.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::with_timeout;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::{DraftText, ProposalSection, ResearchProposal};
use crate::skills::prompts;
use crate::skills::{paper_excerpts, professor_view, prompt_json};
use crate::swarm::context::{RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::{dedupe_strings, word_count};

const DEFAULT_PROPOSAL: &str = "Research proposal generation failed.";
const DEFAULT_TITLE: &str = "Research Proposal";

pub struct ResearchProposalSkill {
    config: ModelConfig,
    llm_timeout: Duration,
}

impl ResearchProposalSkill {
    pub fn new(config: ModelConfig, llm_timeout: Duration) -> Self {
        Self {
            config,
            llm_timeout,
        }
    }

    pub async fn run(prompt: String, config: &ModelConfig) -> anyhow::Result<DraftText> {
        run_llm_function!(config, DraftText, prompts::RESEARCH_PROPOSAL, prompt)
    }
}

fn heading(line: &str) -> Option<&str> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let re = HEADING.get_or_init(|| Regex::new(r"^#{1,6}\s*(.+?)\s*$").expect("valid regex"));
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('#').trim())
        .filter(|h| !h.is_empty())
}

/// Strip list markers such as `-`, `*`, `1.` or `[2]`.
fn reference_entry(line: &str) -> &str {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let re = MARKER.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)]|\[\d+\])\s*").expect("valid regex"));
    match re.find(line) {
        Some(m) => line[m.end()..].trim(),
        None => line.trim(),
    }
}

#[derive(Default)]
struct Parsed {
    abstract_text: String,
    sections: Vec<ProposalSection>,
    references: Vec<String>,
}

impl Parsed {
    fn flush(&mut self, heading: Option<&str>, lines: &[&str]) {
        let Some(heading) = heading else {
            return;
        };
        let content = lines.join("\n").trim().to_string();
        if content.is_empty() {
            return;
        }
        let lower = heading.to_lowercase();
        if lower.contains("abstract") {
            self.abstract_text = content;
        } else if lower.contains("reference") || lower.contains("bibliography") {
            self.references.extend(
                content
                    .lines()
                    .map(reference_entry)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            );
        } else {
            self.sections.push(ProposalSection {
                heading: heading.to_string(),
                content,
            });
        }
    }
}

/// Split a markdown proposal into its parts.
///
/// The title is the first non-heading line. Text before the first heading
/// belongs to no section.
pub fn parse_research_proposal(text: &str) -> ResearchProposal {
    let mut title: Option<String> = None;
    let mut parsed = Parsed::default();
    let mut current: Option<&str> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(h) = heading(trimmed) {
            parsed.flush(current, &lines);
            current = Some(h);
            lines.clear();
            continue;
        }
        if title.is_none() && !trimmed.is_empty() {
            let cleaned = trimmed.trim_matches('*').trim();
            if !cleaned.is_empty() {
                title = Some(cleaned.to_string());
            }
        }
        lines.push(line);
    }
    parsed.flush(current, &lines);

    ResearchProposal {
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        abstract_text: parsed.abstract_text,
        sections: parsed.sections,
        references: dedupe_strings(&parsed.references),
        word_count: word_count(text),
    }
}

pub fn build_proposal(text: &str) -> ResearchProposal {
    match text.trim() {
        "" => parse_research_proposal(DEFAULT_PROPOSAL),
        trimmed => parse_research_proposal(trimmed),
    }
}

#[async_trait]
impl Stage for ResearchProposalSkill {
    fn id(&self) -> &'static str {
        StageKind::ResearchProposalWriter.id()
    }

    fn name(&self) -> &'static str {
        StageKind::ResearchProposalWriter.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::ResearchProposalWriter.opening_action()
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
            "Write a 1500-2000 word research proposal in {} with markdown headings.\n\nApplicant research interests: {}\n\nApplicant profile:\n{}\n\nProfessor profile:\n{}\n\nFit analysis:\n{}",
            input.writing_language(),
            input.research_interests,
            prompt_json(user),
            prompt_json(&professor),
            prompt_json(fit),
        );
        let excerpts = paper_excerpts(ctx);
        if !excerpts.is_empty() {
            prompt.push_str("\n\nExcerpts from the professor's papers:\n");
            prompt.push_str(&excerpts);
        }

        progress.send_update("Drafting research proposal...").await?;
        let draft = progress
            .run_cancellable(with_timeout(
                "research proposal",
                self.llm_timeout,
                Self::run(prompt, &self.config),
            ))
            .await?;

        Ok(StageArtifact::ResearchProposal(build_proposal(&draft.text)))
    }
}
