//! # Professor Researcher Skill
//!
//! Builds the professor profile. Evidence comes from the academic APIs
//! (in the configured order), an optional uploaded image, and bounded web
//! browsing when the API record is thin. The LLM synthesizes a profile from
//! that evidence, which is then normalized against the evidence itself:
//! papers the model names are matched back to real API records, and a
//! full-text locator is never taken from the model.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::with_timeout;
use crate::gather::ResourceCandidate;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::skills::artifact_registry::ProfessorProfile;
use crate::skills::prompts;
use crate::skills::prompt_json;
use crate::skills::tools::academic_api::{AcademicSearch, AuthorProfile};
use crate::skills::tools::image_context::{ImageAnalyzer, ImageContext, VisionEndpoint};
use crate::skills::tools::web_context::{WebBrowser, WebContext};
use crate::skills::tools::Toolbox;
use crate::swarm::context::{ApplicationRequest, RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::dedupe_strings;
use crate::tools::titles::match_title;

const MAX_INTERESTS: usize = 8;
const MAX_PAPERS: usize = 8;
const MAX_PROJECTS: usize = 6;
/// Papers kept from the seed when the model names none
const FALLBACK_PAPERS: usize = 5;
/// Below this many interests or papers the web is consulted
const THIN_RECORD: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedPaper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
}

/// Model-written professor profile; every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_source: Option<String>,
    #[serde(default)]
    pub research_interests: Vec<String>,
    #[serde(default)]
    pub recent_papers: Vec<SynthesizedPaper>,
    #[serde(default)]
    pub current_projects: Vec<String>,
    #[serde(default)]
    pub lab_info: Option<String>,
    #[serde(default)]
    pub lab_url: Option<String>,
    #[serde(default)]
    pub open_positions: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Everything the synthesis call sees
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Evidence<'a> {
    professor_name: &'a str,
    university: &'a str,
    academic_profile: Option<&'a AuthorProfile>,
    web_context: &'a WebContext,
    image_context: &'a ImageContext,
    seed_profile: &'a ProfessorProfile,
}

pub struct ProfessorResearcherSkill {
    config: ModelConfig,
    academic: Arc<AcademicSearch>,
    browser: Arc<WebBrowser>,
    images: Arc<ImageAnalyzer>,
    timeouts: TimeoutConfig,
}

impl ProfessorResearcherSkill {
    pub fn new(config: ModelConfig, toolbox: &Toolbox, timeouts: &TimeoutConfig) -> Self {
        Self {
            config,
            academic: toolbox.academic.clone(),
            browser: toolbox.browser.clone(),
            images: toolbox.images.clone(),
            timeouts: timeouts.clone(),
        }
    }

    /// SDK-style call: synthesize a profile from rendered evidence.
    pub async fn run(evidence: &str, config: &ModelConfig) -> anyhow::Result<SynthesizedProfile> {
        let prompt = format!(
            "Build a professor profile from this evidence. Include provenance URLs in sources.\n\n{}",
            evidence
        );
        run_llm_function!(
            config,
            SynthesizedProfile,
            prompts::PROFESSOR_RESEARCHER,
            prompt
        )
    }

    /// The browser's own deadline plus slack for the request in flight
    fn web_budget(&self) -> Duration {
        self.browser.budget() + self.timeouts.search()
    }

    async fn analyze_image(&self, input: &ApplicationRequest) -> ImageContext {
        let Some(image) = &input.context_image else {
            return ImageContext::default();
        };
        let Some(endpoint) = VisionEndpoint::from_env(self.config.base_url.as_deref(), &self.config.model)
        else {
            tracing::debug!("No vision API key configured, skipping image context");
            return ImageContext::default();
        };
        let analysis = with_timeout(
            "image analysis",
            self.timeouts.image(),
            self.images.analyze(
                &endpoint,
                &image.bytes,
                image.content_type.as_deref(),
                image.filename.as_deref(),
            ),
        )
        .await;
        analysis.unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{:#}", e), "Image analysis failed");
            ImageContext::default()
        })
    }
}

/// Profile built from the API record alone
pub fn seed_profile(input: &ApplicationRequest, author: Option<&AuthorProfile>) -> ProfessorProfile {
    ProfessorProfile {
        name: input.professor_name.clone(),
        title: "Professor".to_string(),
        university: input.university.clone(),
        department: "Unknown Department".to_string(),
        recent_papers: author
            .map(|a| a.papers.iter().take(MAX_PAPERS).cloned().collect())
            .unwrap_or_default(),
        lab_info: "Unknown".to_string(),
        sources: author.map(|a| vec![a.source.clone()]).unwrap_or_default(),
        ..Default::default()
    }
}

/// The web is consulted when the email, interests or papers are thin.
pub fn needs_web_context(seed: &ProfessorProfile) -> bool {
    seed.email.is_none()
        || seed.research_interests.len() < THIN_RECORD
        || seed.recent_papers.len() < THIN_RECORD
}

pub fn apply_web_context(seed: &mut ProfessorProfile, web: &WebContext) {
    if let Some(email) = &web.email {
        seed.email = Some(email.clone());
        seed.email_source = web.sources.first().cloned();
    }
    let mut interests = dedupe_strings(seed.research_interests.iter().chain(&web.research_interests));
    interests.truncate(MAX_INTERESTS);
    seed.research_interests = interests;
}

fn text_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn opt_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve the model's paper list against the API papers.
///
/// A named paper that matches a seed paper becomes that seed record. One
/// that matches nothing keeps its metadata but loses any full-text locator.
/// Remaining seed papers fill the list up to the cap.
pub fn reconcile_papers(
    synthesized: Vec<SynthesizedPaper>,
    seed: &[ResourceCandidate],
) -> Vec<ResourceCandidate> {
    fn push(paper: ResourceCandidate, papers: &mut Vec<ResourceCandidate>) {
        let key = paper.key();
        if !key.is_empty() && !papers.iter().any(|p| p.key() == key) {
            papers.push(paper);
        }
    }

    let mut papers: Vec<ResourceCandidate> = Vec::new();

    let named = !synthesized.is_empty();
    for paper in synthesized {
        let Some(title) = opt_text(paper.title) else {
            continue;
        };
        match match_title(&title, seed, |c| c.title.as_str()) {
            Some(known) => push(known.clone(), &mut papers),
            None => push(
                ResourceCandidate {
                    title,
                    year: paper.year.filter(|y| *y > 0),
                    abstract_text: opt_text(paper.abstract_text),
                    url: opt_text(paper.url),
                    venue: opt_text(paper.venue),
                    pdf_url: None,
                    ..Default::default()
                },
                &mut papers,
            ),
        }
    }

    let fill = if named && !papers.is_empty() {
        MAX_PAPERS
    } else {
        FALLBACK_PAPERS
    };
    for paper in seed {
        if papers.len() >= fill {
            break;
        }
        push(paper.clone(), &mut papers);
    }
    papers.truncate(MAX_PAPERS);
    papers
}

/// Merge the model's profile over the seed, filling defaults and caps.
pub fn normalize_profile(
    synthesized: SynthesizedProfile,
    seed: &ProfessorProfile,
    sources: &[String],
) -> ProfessorProfile {
    let mut interests = dedupe_strings(
        seed.research_interests
            .iter()
            .chain(&synthesized.research_interests),
    );
    interests.truncate(MAX_INTERESTS);

    let mut projects = if synthesized.current_projects.is_empty() {
        dedupe_strings(&seed.current_projects)
    } else {
        dedupe_strings(&synthesized.current_projects)
    };
    projects.truncate(MAX_PROJECTS);

    ProfessorProfile {
        name: text_or(synthesized.name, &seed.name),
        title: text_or(synthesized.title, &seed.title),
        university: text_or(synthesized.university, &seed.university),
        department: text_or(synthesized.department, &seed.department),
        email: opt_text(synthesized.email).or_else(|| seed.email.clone()),
        email_source: opt_text(synthesized.email_source).or_else(|| seed.email_source.clone()),
        research_interests: interests,
        recent_papers: reconcile_papers(synthesized.recent_papers, &seed.recent_papers),
        current_projects: projects,
        lab_info: text_or(synthesized.lab_info, &seed.lab_info),
        lab_url: opt_text(synthesized.lab_url).or_else(|| seed.lab_url.clone()),
        open_positions: opt_text(synthesized.open_positions)
            .or_else(|| seed.open_positions.clone()),
        sources: dedupe_strings(
            sources
                .iter()
                .chain(&seed.sources)
                .chain(&synthesized.sources),
        ),
    }
}

#[async_trait]
impl Stage for ProfessorResearcherSkill {
    fn id(&self) -> &'static str {
        StageKind::ProfessorResearcher.id()
    }

    fn name(&self) -> &'static str {
        StageKind::ProfessorResearcher.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::ProfessorResearcher.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        let input = ctx.input();

        let author = progress
            .run_cancellable(with_timeout(
                "author search",
                self.timeouts.search() * 3,
                async {
                    Ok(self
                        .academic
                        .find_author(&input.professor_name, Some(&input.university))
                        .await)
                },
            ))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Author search abandoned");
                None
            });
        progress.ensure_live()?;

        let image_context_used = input.context_image.is_some();
        let image_context = if image_context_used {
            progress
                .send_update("Analyzing optional image context...")
                .await?;
            self.analyze_image(input).await
        } else {
            ImageContext::default()
        };

        let mut seed = seed_profile(input, author.as_ref());
        let mut web = WebContext::default();
        if needs_web_context(&seed) {
            progress
                .send_update("Browsing academic web sources...")
                .await?;
            web = progress
                .run_cancellable(with_timeout("web browsing", self.web_budget(), async {
                    Ok(self
                        .browser
                        .gather(&input.professor_name, &input.university, &[])
                        .await)
                }))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Web browsing abandoned");
                    WebContext::default()
                });
            progress.ensure_live()?;
            apply_web_context(&mut seed, &web);
        }

        progress
            .send_update("Synthesizing professor profile...")
            .await?;
        let evidence = prompt_json(&Evidence {
            professor_name: &input.professor_name,
            university: &input.university,
            academic_profile: author.as_ref(),
            web_context: &web,
            image_context: &image_context,
            seed_profile: &seed,
        });
        let synthesized = match progress
            .run_cancellable(with_timeout(
                "profile synthesis",
                self.timeouts.oracle(),
                Self::run(&evidence, &self.config),
            ))
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                progress.ensure_live()?;
                tracing::warn!(error = %format!("{:#}", e), "Profile synthesis failed, using gathered evidence only");
                SynthesizedProfile::default()
            }
        };

        let provenance: Vec<String> = author
            .iter()
            .map(|a| a.source.clone())
            .chain(web.sources.iter().cloned())
            .collect();
        let profile = normalize_profile(synthesized, &seed, &provenance);
        tracing::info!(
            papers = profile.recent_papers.len(),
            interests = profile.research_interests.len(),
            has_email = profile.email.is_some(),
            "Professor profile built"
        );

        Ok(StageArtifact::ProfessorResearch {
            profile,
            web_steps_used: web.web_steps_used,
            image_context_used,
            sources: provenance,
        })
    }
}
