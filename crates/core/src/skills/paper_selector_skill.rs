//! # Paper Selector Skill
//!
//! Decides which of the professor's papers to read in full. The adaptive
//! gatherer works through the known papers under the configured budget;
//! the external search then looks for relevant titles the professor profile
//! does not list. Neither loop fails the stage when the oracle is
//! unavailable, so this stage only fails on cancellation or a stage timeout.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{CoordinatorConfig, ExternalSearchConfig, GatherConfig, TimeoutConfig};
use crate::gather::{
    AdaptiveGatherer, DecisionOracle, ExternalOutcome, ExternalSearch, FetchedResource,
    GatherFocus, GatherOutcome, PaperFetcher, ResourceCandidate, TitleLookup,
};
use crate::skills::artifact_registry::{
    ExternalAttemptSummary, PaperSelection, ProfessorProfile, SelectedPaper, UserProfile,
};
use crate::swarm::context::{ApplicationRequest, RunContext, StageArtifact};
use crate::swarm::pipeline::StageKind;
use crate::swarm::stage::{ProgressSender, Stage};
use crate::tools::text::truncate_chars;
use crate::tools::titles::match_title;

/// Characters of full text kept per selected paper
pub const EXCERPT_CHARS: usize = 1500;
/// Papers listed when nothing could be read
const UNREAD_FALLBACK: usize = 3;

const EXTERNAL_REASON: &str = "Found via title lookup.";
const ORACLE_REASON: &str = "Selected for relevance.";
const UNREAD_REASON: &str = "Listed among the professor's recent papers; full text unavailable.";

pub struct PaperSelectorSkill {
    oracle: Arc<dyn DecisionOracle>,
    fetcher: Arc<dyn PaperFetcher>,
    lookup: Arc<dyn TitleLookup>,
    gather: GatherConfig,
    external: ExternalSearchConfig,
    timeouts: TimeoutConfig,
}

impl PaperSelectorSkill {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        fetcher: Arc<dyn PaperFetcher>,
        lookup: Arc<dyn TitleLookup>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            lookup,
            gather: config.gather.clone(),
            external: config.external_search.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// SDK-style call: both gathering loops over `seed`.
    pub async fn run(
        &self,
        seed: Vec<ResourceCandidate>,
        focus: &GatherFocus,
        progress: &ProgressSender,
    ) -> anyhow::Result<(GatherOutcome, Option<ExternalOutcome>)> {
        let deadline = Instant::now() + self.timeouts.gather_budget();
        let gathered = AdaptiveGatherer::new(self.gather.clone(), &self.timeouts)
            .with_deadline(deadline)
            .gather(seed, focus, self.oracle.as_ref(), self.fetcher.as_ref(), progress)
            .await?;

        if !self.external.enabled || self.external.capacity == 0 {
            return Ok((gathered, None));
        }

        progress
            .send_update("Looking beyond the professor's listed papers...")
            .await?;
        let external = ExternalSearch::new(self.external.clone(), &self.timeouts)
            .with_deadline(deadline)
            .search(
                &gathered.pool,
                focus,
                gathered.search_hints(),
                self.oracle.as_ref(),
                self.lookup.as_ref(),
                self.fetcher.as_ref(),
                progress,
            )
            .await?;
        Ok((gathered, Some(external)))
    }
}

pub fn gather_focus(
    input: &ApplicationRequest,
    user: &UserProfile,
    professor: &ProfessorProfile,
) -> GatherFocus {
    GatherFocus {
        applicant_interests: input.research_interests.clone(),
        applicant_summary: user.summary.clone(),
        professor_name: professor.name.clone(),
        professor_interests: professor.research_interests.clone(),
    }
}

/// Why a seeded paper was read, taken from the decision that fetched it
fn seeded_reason(resource: &FetchedResource, gathered: &GatherOutcome) -> String {
    let Some(record) = gathered
        .history
        .iter()
        .find(|h| h.iteration == resource.iteration)
    else {
        return ORACLE_REASON.to_string();
    };
    match_title(&resource.candidate.title, &record.decision.fetch, |r| {
        r.title.as_str()
    })
    .map(|r| r.rationale.trim().to_string())
    .filter(|r| !r.is_empty())
    .unwrap_or_else(|| ORACLE_REASON.to_string())
}

fn selected(resource: &FetchedResource, reason: String, external: bool) -> SelectedPaper {
    SelectedPaper {
        paper: resource.candidate.clone(),
        selection_reason: reason,
        excerpt: truncate_chars(resource.content.trim(), EXCERPT_CHARS).to_string(),
        external,
    }
}

/// Assemble the stage artifact from both loops.
///
/// Read papers come first in fetch order, seeded before external. The
/// professor's own papers are reordered so the read ones lead; external
/// papers never join that list. When nothing could be read the first few
/// known papers stand in, without excerpts.
pub fn build_selection(
    seed: &[ResourceCandidate],
    gathered: &GatherOutcome,
    external: Option<&ExternalOutcome>,
) -> PaperSelection {
    let mut chosen: Vec<SelectedPaper> = gathered
        .pool
        .fetched()
        .iter()
        .map(|r| selected(r, seeded_reason(r, gathered), false))
        .collect();
    let total_seeded = chosen.len();
    let additional = external.map(|e| e.pool.fetched_count()).unwrap_or(0);
    if let Some(external) = external {
        chosen.extend(
            external
                .pool
                .fetched()
                .iter()
                .map(|r| selected(r, EXTERNAL_REASON.to_string(), true)),
        );
    }

    if chosen.is_empty() {
        chosen = seed
            .iter()
            .take(UNREAD_FALLBACK)
            .map(|paper| SelectedPaper {
                paper: paper.clone(),
                selection_reason: UNREAD_REASON.to_string(),
                excerpt: String::new(),
                external: false,
            })
            .collect();
    }

    let lead_keys: Vec<String> = chosen
        .iter()
        .filter(|p| !p.external)
        .map(|p| p.paper.key())
        .collect();
    let mut ordered_papers: Vec<ResourceCandidate> = lead_keys
        .iter()
        .filter_map(|key| seed.iter().find(|p| &p.key() == key).cloned())
        .collect();
    ordered_papers.extend(
        seed.iter()
            .filter(|p| !lead_keys.contains(&p.key()))
            .cloned(),
    );

    PaperSelection {
        total_downloaded: total_seeded + additional,
        additional_downloaded: additional,
        iterations: gathered.iterations() + external.map(|e| e.iterations).unwrap_or(0),
        papers: chosen.iter().map(|p| p.paper.title.clone()).collect(),
        selected: chosen,
        ordered_papers,
        stop_reason: gathered.stop_reason,
        history: gathered.history.clone(),
        external_attempts: external
            .map(|e| {
                e.attempts
                    .iter()
                    .map(|a| ExternalAttemptSummary {
                        title: a.title.clone(),
                        resolved_title: a.resolved_title.clone(),
                        outcome: a.outcome.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[async_trait]
impl Stage for PaperSelectorSkill {
    fn id(&self) -> &'static str {
        StageKind::PaperSelector.id()
    }

    fn name(&self) -> &'static str {
        StageKind::PaperSelector.display_name()
    }

    fn opening_action(&self) -> &'static str {
        StageKind::PaperSelector.opening_action()
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        progress: &ProgressSender,
    ) -> anyhow::Result<StageArtifact> {
        let professor = ctx.professor_profile()?;
        let focus = gather_focus(ctx.input(), ctx.user_profile()?, professor);
        let seed = professor.recent_papers.clone();
        tracing::info!(
            candidates = seed.len(),
            fetchable = seed.iter().filter(|p| p.is_fetchable()).count(),
            "Selecting papers"
        );

        let (gathered, external) = self.run(seed.clone(), &focus, progress).await?;
        let selection = build_selection(&seed, &gathered, external.as_ref());
        Ok(StageArtifact::PaperSelection(selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{with_timeout, PipelineError};
    use crate::gather::decision::{
        RawExternalPaper, RawExternalSuggestion, RawGatherDecision, RawRecommendation,
        RawSufficiency,
    };
    use crate::gather::oracle::{DecisionRequest, ExternalRequest, SufficiencyRequest};
    use crate::skills::test_support::{paper, researched_context};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Picks the first candidate each time; suggests one outside title once.
    struct FirstPickOracle {
        failing: bool,
    }

    #[async_trait]
    impl DecisionOracle for FirstPickOracle {
        async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<RawGatherDecision> {
            if self.failing {
                anyhow::bail!("provider unavailable");
            }
            Ok(RawGatherDecision {
                papers_to_fetch: Some(
                    request
                        .candidates
                        .iter()
                        .filter(|c| c.has_full_text)
                        .take(1)
                        .map(|c| RawRecommendation {
                            title: Some(c.title.clone()),
                            reason: Some("Closest to the applicant's work".to_string()),
                            priority: Some("high".to_string()),
                        })
                        .collect(),
                ),
                should_continue: Some(true),
                ..Default::default()
            })
        }

        async fn assess_sufficiency(
            &self,
            _request: &SufficiencyRequest,
        ) -> anyhow::Result<RawSufficiency> {
            Ok(RawSufficiency::default())
        }

        async fn suggest_external(
            &self,
            request: &ExternalRequest,
        ) -> anyhow::Result<RawExternalSuggestion> {
            if self.failing {
                anyhow::bail!("provider unavailable");
            }
            let papers = if request.previous_attempts.is_empty() {
                vec![RawExternalPaper {
                    title: Some("Program Synthesis Survey".to_string()),
                    ..Default::default()
                }]
            } else {
                Vec::new()
            };
            Ok(RawExternalSuggestion {
                papers: Some(papers),
                should_continue: Some(false),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct TextFetcher {
        calls: AtomicUsize,
        cancel_on_fetch: Option<CancellationToken>,
    }

    #[async_trait]
    impl PaperFetcher for TextFetcher {
        async fn fetch(&self, candidate: &ResourceCandidate) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            Ok(format!("Full text of {}. {}", candidate.title, "word ".repeat(600)))
        }
    }

    struct MapLookup(HashMap<String, ResourceCandidate>);

    #[async_trait]
    impl TitleLookup for MapLookup {
        async fn lookup_by_title(
            &self,
            title: &str,
            _keywords: &[String],
        ) -> anyhow::Result<Option<ResourceCandidate>> {
            Ok(self.0.get(title).cloned())
        }
    }

    fn config(capacity: usize, max_iterations: usize) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.gather = GatherConfig {
            capacity,
            max_iterations,
            reference_year: Some(2025),
        };
        config
    }

    fn skill(failing: bool, fetcher: Arc<TextFetcher>, config: &CoordinatorConfig) -> PaperSelectorSkill {
        let survey = paper("Program Synthesis Survey", true);
        PaperSelectorSkill::new(
            Arc::new(FirstPickOracle { failing }),
            fetcher,
            Arc::new(MapLookup(HashMap::from([(survey.title.clone(), survey)]))),
            config,
        )
    }

    fn seed() -> Vec<ResourceCandidate> {
        vec![
            paper("Notes on the Analytical Engine", false),
            paper("Sketch of the Engine", true),
            paper("Bernoulli Numbers by Machine", true),
        ]
    }

    #[tokio::test]
    async fn test_selection_reads_seed_then_external() {
        let ctx = researched_context(seed());
        let fetcher = Arc::new(TextFetcher::default());
        let (progress, _rx) = ProgressSender::channel(CancellationToken::new(), 256);

        let artifact = skill(false, fetcher.clone(), &config(2, 5))
            .execute(&ctx, &progress)
            .await
            .unwrap();
        let StageArtifact::PaperSelection(selection) = artifact else {
            panic!("expected a paper selection");
        };

        assert_eq!(
            selection.papers,
            vec![
                "Sketch of the Engine",
                "Bernoulli Numbers by Machine",
                "Program Synthesis Survey"
            ]
        );
        assert_eq!(selection.total_downloaded, 3);
        assert_eq!(selection.additional_downloaded, 1);
        assert_eq!(selection.selected[0].selection_reason, "Closest to the applicant's work");
        assert_eq!(selection.selected[2].selection_reason, EXTERNAL_REASON);
        assert!(selection.selected[2].external);
        assert!(selection.selected[0].excerpt.chars().count() <= EXCERPT_CHARS);

        // Read papers lead; the unreadable one keeps its place after them
        let ordered: Vec<_> = selection.ordered_papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(
            ordered,
            vec![
                "Sketch of the Engine",
                "Bernoulli Numbers by Machine",
                "Notes on the Analytical Engine"
            ]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_oracle_outage_never_fails_the_stage() {
        let ctx = researched_context(seed());
        let fetcher = Arc::new(TextFetcher::default());
        let (progress, _rx) = ProgressSender::channel(CancellationToken::new(), 256);

        let artifact = skill(true, fetcher, &config(1, 3))
            .execute(&ctx, &progress)
            .await
            .unwrap();
        let StageArtifact::PaperSelection(selection) = artifact else {
            panic!("expected a paper selection");
        };

        assert_eq!(selection.total_downloaded, 1);
        assert_eq!(selection.additional_downloaded, 0);
        assert!(selection.selected[0]
            .selection_reason
            .starts_with("Ranked by recency and citations"));
        assert!(selection.external_attempts.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_readable_lists_known_papers() {
        let unreadable: Vec<_> = (0..5)
            .map(|i| paper(&format!("Unpublished note {}", i), false))
            .collect();
        let ctx = researched_context(unreadable);
        let mut config = config(3, 3);
        config.external_search.enabled = false;
        let (progress, _rx) = ProgressSender::channel(CancellationToken::new(), 256);

        let artifact = skill(false, Arc::new(TextFetcher::default()), &config)
            .execute(&ctx, &progress)
            .await
            .unwrap();
        let StageArtifact::PaperSelection(selection) = artifact else {
            panic!("expected a paper selection");
        };

        assert_eq!(selection.total_downloaded, 0);
        assert_eq!(selection.selected.len(), UNREAD_FALLBACK);
        assert!(selection.selected.iter().all(|p| p.excerpt.is_empty()));
        assert_eq!(selection.ordered_papers.len(), 5);
    }

    /// Never answers: every call waits until its timeout fires.
    struct HungOracle;

    #[async_trait]
    impl DecisionOracle for HungOracle {
        async fn decide(&self, _: &DecisionRequest) -> anyhow::Result<RawGatherDecision> {
            std::future::pending().await
        }

        async fn assess_sufficiency(&self, _: &SufficiencyRequest) -> anyhow::Result<RawSufficiency> {
            std::future::pending().await
        }

        async fn suggest_external(
            &self,
            _: &ExternalRequest,
        ) -> anyhow::Result<RawExternalSuggestion> {
            std::future::pending().await
        }
    }

    struct HungFetcher;

    #[async_trait]
    impl PaperFetcher for HungFetcher {
        async fn fetch(&self, _: &ResourceCandidate) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_services_finish_within_stage_timeout() {
        let seed: Vec<_> = (0..8)
            .map(|i| paper(&format!("Engine design study {}", i), true))
            .collect();
        let ctx = researched_context(seed);
        let config = CoordinatorConfig::default();
        let skill = PaperSelectorSkill::new(
            Arc::new(HungOracle),
            Arc::new(HungFetcher),
            Arc::new(MapLookup(HashMap::new())),
            &config,
        );
        let (progress, _rx) = ProgressSender::channel(CancellationToken::new(), 256);

        let started = Instant::now();
        let artifact = with_timeout(
            "paper selector",
            config.timeouts.stage(),
            skill.execute(&ctx, &progress),
        )
        .await
        .unwrap();
        assert!(started.elapsed() <= config.timeouts.gather_budget());

        let StageArtifact::PaperSelection(selection) = artifact else {
            panic!("expected a paper selection");
        };
        assert_eq!(selection.total_downloaded, 0);
        assert_eq!(selection.selected.len(), UNREAD_FALLBACK);
        assert!(selection
            .history
            .iter()
            .all(|h| h.sufficiency.is_none() && !h.failed.is_empty()));
    }

    #[tokio::test]
    async fn test_cancellation_during_fetch_stops_the_stage() {
        let ctx = researched_context(seed());
        let token = CancellationToken::new();
        let fetcher = Arc::new(TextFetcher {
            cancel_on_fetch: Some(token.clone()),
            ..Default::default()
        });
        let (progress, _rx) = ProgressSender::channel(token, 256);

        let err = skill(false, fetcher.clone(), &config(3, 5))
            .execute(&ctx, &progress)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Cancelled)
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
