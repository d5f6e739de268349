//! # Adaptive Gatherer
//!
//! Two bounded loops that decide, one iteration at a time, which papers to
//! read. [`AdaptiveGatherer`] works through the seed candidates under a
//! capacity and iteration budget, asking the oracle what to fetch next and
//! falling back to [`scoring`](super::scoring) when it cannot answer.
//! [`ExternalSearch`] then looks for titles outside the seed set, feeding
//! every earlier attempt back into the next oracle call.
//!
//! Both loops share one deadline, so an unreachable oracle or a hanging
//! download ends gathering early instead of running past the stage timeout.

use chrono::Datelike;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

use super::decision::{DecisionSource, ExternalHint, ExternalSuggestion, GatherDecision, SufficiencyVerdict};
use super::oracle::{
    CandidateBrief, DecisionOracle, DecisionRequest, ExternalRequest, FetchedBrief, GatherFocus,
    SufficiencyRequest,
};
use super::pool::{ResourceCandidate, ResourceOrigin, ResourcePool};
use super::scoring::fallback_decision;
use super::{PaperFetcher, TitleLookup};
use crate::config::{ExternalSearchConfig, GatherConfig, TimeoutConfig};
use crate::error::with_timeout;
use crate::swarm::stage::ProgressSender;
use crate::tools::titles::{match_title, normalize_title};

/// Why a gathering loop ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CapacityReached,
    CandidatesExhausted,
    OracleStopped,
    Sufficient,
    OracleFailed,
    IterationBudget,
    Deadline,
}

/// Wait allowed for the next call: `limit`, cut short by `deadline`.
/// `None` once the deadline has passed.
fn time_left(deadline: Instant, limit: Duration) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then(|| left.min(limit))
}

/// Append-only record of one seeded iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherIteration {
    pub iteration: usize,
    pub decision: GatherDecision,
    pub fetched: Vec<String>,
    pub failed: Vec<String>,
    /// Recommendations that matched no candidate; skipped
    pub unmatched: Vec<String>,
    /// Recommendations already fetched or already failed; skipped
    pub duplicates: Vec<String>,
    pub sufficiency: Option<SufficiencyVerdict>,
}

impl GatherIteration {
    fn new(iteration: usize, decision: GatherDecision) -> Self {
        Self {
            iteration,
            decision,
            fetched: Vec::new(),
            failed: Vec::new(),
            unmatched: Vec::new(),
            duplicates: Vec::new(),
            sufficiency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatherOutcome {
    pub pool: ResourcePool,
    pub history: Vec<GatherIteration>,
    pub stop_reason: StopReason,
}

impl GatherOutcome {
    /// Iterations that reached the decision step
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    /// Search hints from every decision, in order, without repeats
    pub fn search_hints(&self) -> Vec<String> {
        crate::tools::text::dedupe_strings(
            self.history
                .iter()
                .flat_map(|h| h.decision.search_hints.iter()),
        )
    }
}

pub struct AdaptiveGatherer {
    config: GatherConfig,
    oracle_timeout: Duration,
    fetch_timeout: Duration,
    budget: Duration,
    deadline: Option<Instant>,
}

impl AdaptiveGatherer {
    pub fn new(config: GatherConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            config,
            oracle_timeout: timeouts.oracle(),
            fetch_timeout: timeouts.fetch(),
            budget: timeouts.gather_budget(),
            deadline: None,
        }
    }

    /// Finish by `deadline` instead of the gather budget counted from the
    /// start of [`gather`](Self::gather).
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn reference_year(&self) -> i32 {
        self.config
            .reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    /// Run the seeded loop. Only cancellation is an error; oracle and fetch
    /// failures are absorbed into the history.
    #[tracing::instrument(skip_all, fields(capacity = self.config.capacity, max_iterations = self.config.max_iterations))]
    pub async fn gather(
        &self,
        seed: Vec<ResourceCandidate>,
        focus: &GatherFocus,
        oracle: &dyn DecisionOracle,
        fetcher: &dyn PaperFetcher,
        progress: &ProgressSender,
    ) -> anyhow::Result<GatherOutcome> {
        let deadline = self.deadline.unwrap_or_else(|| Instant::now() + self.budget);
        let mut pool = ResourcePool::new(seed, self.config.capacity);
        let mut history: Vec<GatherIteration> = Vec::new();
        let mut stop_reason = StopReason::IterationBudget;

        for iteration in 1..=self.config.max_iterations {
            progress.ensure_live()?;
            if pool.is_full() {
                stop_reason = StopReason::CapacityReached;
                break;
            }
            let unfetched = pool.unfetched();
            if unfetched.is_empty() {
                stop_reason = StopReason::CandidatesExhausted;
                break;
            }

            progress
                .send_update(format!(
                    "Iteration {}: weighing {} candidate papers...",
                    iteration,
                    unfetched.len()
                ))
                .await?;

            let request = DecisionRequest {
                focus: focus.clone(),
                iteration,
                max_iterations: self.config.max_iterations,
                remaining_slots: pool.remaining_slots(),
                fetched_titles: pool.fetched_titles(),
                candidates: unfetched.iter().map(CandidateBrief::from).collect(),
            };
            let Some(wait) = time_left(deadline, self.oracle_timeout) else {
                stop_reason = StopReason::Deadline;
                break;
            };
            let decision = match progress
                .run_cancellable(with_timeout("paper decision", wait, oracle.decide(&request)))
                .await
            {
                Ok(raw) => GatherDecision::from(raw),
                Err(e) => {
                    progress.ensure_live()?;
                    if time_left(deadline, wait).is_none() {
                        tracing::warn!(iteration, "Gathering deadline passed during paper decision");
                        stop_reason = StopReason::Deadline;
                        break;
                    }
                    tracing::warn!(iteration, error = %e, "Decision oracle failed, ranking by recency and citations");
                    fallback_decision(&unfetched, self.reference_year(), pool.remaining_slots())
                }
            };

            let mut record = GatherIteration::new(iteration, decision.clone());
            let mut out_of_time = false;
            for recommendation in &decision.fetch {
                if pool.is_full() {
                    break;
                }
                progress.ensure_live()?;

                let Some(candidate) =
                    match_title(&recommendation.title, pool.candidates(), |c| c.title.as_str())
                        .cloned()
                else {
                    tracing::debug!(title = %recommendation.title, "Recommendation matched no candidate");
                    record.unmatched.push(recommendation.title.clone());
                    continue;
                };

                let key = candidate.key();
                if pool.is_fetched(&key) || pool.has_failed(&key) {
                    record.duplicates.push(candidate.title.clone());
                    continue;
                }

                let Some(wait) = time_left(deadline, self.fetch_timeout) else {
                    out_of_time = true;
                    break;
                };
                progress
                    .send_update(format!("Reading \"{}\"...", candidate.title))
                    .await?;
                match progress
                    .run_cancellable(with_timeout("paper fetch", wait, fetcher.fetch(&candidate)))
                    .await
                {
                    Ok(content) => {
                        record.fetched.push(candidate.title.clone());
                        pool.insert(candidate, content, iteration, ResourceOrigin::Seed);
                    }
                    Err(e) => {
                        progress.ensure_live()?;
                        tracing::warn!(title = %candidate.title, error = %e, "Paper fetch failed");
                        record.failed.push(candidate.title.clone());
                        pool.record_failure(&candidate, format!("{:#}", e), iteration);
                    }
                }
            }

            progress
                .send_update(format!(
                    "Iteration {}: {} of {} papers read",
                    iteration,
                    pool.fetched_count(),
                    pool.capacity()
                ))
                .await?;
            history.push(record);

            if pool.is_full() {
                stop_reason = StopReason::CapacityReached;
                break;
            }
            if out_of_time {
                tracing::warn!(iteration, "Gathering deadline passed while reading papers");
                stop_reason = StopReason::Deadline;
                break;
            }
            if !decision.should_continue {
                stop_reason = StopReason::OracleStopped;
                break;
            }
            // No sufficiency check after a fallback decision
            if decision.source == DecisionSource::Fallback {
                continue;
            }

            let Some(wait) = time_left(deadline, self.oracle_timeout) else {
                stop_reason = StopReason::Deadline;
                break;
            };
            let request = SufficiencyRequest {
                focus: focus.clone(),
                iteration,
                remaining_slots: pool.remaining_slots(),
                fetched: pool.fetched().iter().map(FetchedBrief::from).collect(),
            };
            match progress
                .run_cancellable(with_timeout(
                    "sufficiency check",
                    wait,
                    oracle.assess_sufficiency(&request),
                ))
                .await
            {
                Ok(raw) => {
                    let verdict = SufficiencyVerdict::from(raw);
                    let sufficient = verdict.sufficient;
                    if let Some(last) = history.last_mut() {
                        last.sufficiency = Some(verdict);
                    }
                    if sufficient {
                        stop_reason = StopReason::Sufficient;
                        break;
                    }
                }
                Err(e) => {
                    progress.ensure_live()?;
                    tracing::warn!(iteration, error = %e, "Sufficiency check failed, continuing");
                }
            }
        }

        tracing::info!(
            fetched = pool.fetched_count(),
            iterations = history.len(),
            ?stop_reason,
            "Seeded gathering finished"
        );
        Ok(GatherOutcome {
            pool,
            history,
            stop_reason,
        })
    }
}

/// Result of one external lookup attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Fetched,
    NotFound,
    AlreadyKnown,
    NoFullText,
    CapacityReached,
    LookupFailed { reason: String },
    FetchFailed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAttempt {
    pub iteration: usize,
    pub title: String,
    pub keywords: Vec<String>,
    /// Title of the paper the lookup resolved to, if any
    pub resolved_title: Option<String>,
    pub outcome: AttemptOutcome,
}

impl ExternalAttempt {
    fn new(iteration: usize, hint: &ExternalHint, outcome: AttemptOutcome) -> Self {
        Self {
            iteration,
            title: hint.title.clone(),
            keywords: hint.keywords.clone(),
            resolved_title: None,
            outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalOutcome {
    pub pool: ResourcePool,
    pub attempts: Vec<ExternalAttempt>,
    pub iterations: usize,
    pub stop_reason: StopReason,
}

pub struct ExternalSearch {
    config: ExternalSearchConfig,
    oracle_timeout: Duration,
    search_timeout: Duration,
    fetch_timeout: Duration,
    budget: Duration,
    deadline: Option<Instant>,
}

impl ExternalSearch {
    pub fn new(config: ExternalSearchConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            config,
            oracle_timeout: timeouts.oracle(),
            search_timeout: timeouts.search(),
            fetch_timeout: timeouts.fetch(),
            budget: timeouts.gather_budget(),
            deadline: None,
        }
    }

    /// Share a deadline with the seeded loop that ran first.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Look for papers outside `known`. Lookups within an iteration run
    /// concurrently and are all joined before any fetch starts.
    #[tracing::instrument(skip_all, fields(capacity = self.config.capacity))]
    #[allow(clippy::too_many_arguments)]
    pub async fn search(
        &self,
        known: &ResourcePool,
        focus: &GatherFocus,
        search_hints: Vec<String>,
        oracle: &dyn DecisionOracle,
        lookup: &dyn TitleLookup,
        fetcher: &dyn PaperFetcher,
        progress: &ProgressSender,
    ) -> anyhow::Result<ExternalOutcome> {
        let deadline = self.deadline.unwrap_or_else(|| Instant::now() + self.budget);
        let mut pool = ResourcePool::new(Vec::new(), self.config.capacity);
        let mut attempts: Vec<ExternalAttempt> = Vec::new();
        let mut attempted: HashSet<String> = HashSet::new();
        let mut iterations = 0;
        let mut stop_reason = StopReason::IterationBudget;
        let batch_limit = self.config.parallel_lookups.max(1);

        for iteration in 1..=self.config.max_iterations {
            progress.ensure_live()?;
            if pool.is_full() {
                stop_reason = StopReason::CapacityReached;
                break;
            }
            let Some(wait) = time_left(deadline, self.oracle_timeout) else {
                stop_reason = StopReason::Deadline;
                break;
            };
            iterations = iteration;

            let request = ExternalRequest {
                focus: focus.clone(),
                iteration,
                remaining_slots: pool.remaining_slots(),
                known_titles: known
                    .candidates()
                    .iter()
                    .chain(pool.candidates())
                    .map(|c| c.title.clone())
                    .collect(),
                search_hints: search_hints.clone(),
                previous_attempts: attempts.clone(),
            };
            let suggestion = match progress
                .run_cancellable(with_timeout(
                    "external paper suggestion",
                    wait,
                    oracle.suggest_external(&request),
                ))
                .await
            {
                Ok(raw) => ExternalSuggestion::from(raw),
                Err(e) => {
                    progress.ensure_live()?;
                    tracing::warn!(iteration, error = %e, "External suggestion failed, stopping search");
                    stop_reason = match time_left(deadline, wait) {
                        Some(_) => StopReason::OracleFailed,
                        None => StopReason::Deadline,
                    };
                    break;
                }
            };

            let mut batch: Vec<ExternalHint> = Vec::new();
            for hint in suggestion.papers {
                if batch.len() >= batch_limit.min(pool.remaining_slots()) {
                    break;
                }
                let key = normalize_title(&hint.title);
                if known.knows(&key) || pool.knows(&key) || !attempted.insert(key) {
                    attempts.push(ExternalAttempt::new(
                        iteration,
                        &hint,
                        AttemptOutcome::AlreadyKnown,
                    ));
                    continue;
                }
                batch.push(hint);
            }

            if !batch.is_empty() {
                let Some(lookup_wait) = time_left(deadline, self.search_timeout) else {
                    stop_reason = StopReason::Deadline;
                    break;
                };
                progress
                    .send_update(format!(
                        "Searching for {} additional papers...",
                        batch.len()
                    ))
                    .await?;

                let lookups = join_all(batch.iter().map(|hint| {
                    with_timeout(
                        "paper lookup",
                        lookup_wait,
                        lookup.lookup_by_title(&hint.title, &hint.keywords),
                    )
                }));
                let results = progress.run_cancellable(async { Ok(lookups.await) }).await?;

                for (hint, result) in batch.iter().zip(results) {
                    let mut attempt =
                        ExternalAttempt::new(iteration, hint, AttemptOutcome::NotFound);
                    match result {
                        Err(e) => {
                            attempt.outcome = AttemptOutcome::LookupFailed {
                                reason: format!("{:#}", e),
                            };
                        }
                        Ok(None) => {}
                        Ok(Some(found)) => {
                            attempt.resolved_title = Some(found.title.clone());
                            attempt.outcome = self
                                .fetch_found(found, known, &mut pool, iteration, deadline, fetcher, progress)
                                .await?;
                        }
                    }
                    tracing::debug!(title = %attempt.title, outcome = ?attempt.outcome, "External attempt");
                    attempts.push(attempt);
                }
            }

            if pool.is_full() {
                stop_reason = StopReason::CapacityReached;
                break;
            }
            if time_left(deadline, self.oracle_timeout).is_none() {
                stop_reason = StopReason::Deadline;
                break;
            }
            if !suggestion.should_continue {
                stop_reason = StopReason::OracleStopped;
                break;
            }
        }

        tracing::info!(
            fetched = pool.fetched_count(),
            attempts = attempts.len(),
            ?stop_reason,
            "External search finished"
        );
        Ok(ExternalOutcome {
            pool,
            attempts,
            iterations,
            stop_reason,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_found(
        &self,
        found: ResourceCandidate,
        known: &ResourcePool,
        pool: &mut ResourcePool,
        iteration: usize,
        deadline: Instant,
        fetcher: &dyn PaperFetcher,
        progress: &ProgressSender,
    ) -> anyhow::Result<AttemptOutcome> {
        let key = found.key();
        if key.is_empty() || known.knows(&key) || pool.knows(&key) {
            return Ok(AttemptOutcome::AlreadyKnown);
        }
        if pool.is_full() {
            return Ok(AttemptOutcome::CapacityReached);
        }
        if !found.is_fetchable() {
            return Ok(AttemptOutcome::NoFullText);
        }
        let Some(wait) = time_left(deadline, self.fetch_timeout) else {
            return Ok(AttemptOutcome::FetchFailed {
                reason: "gathering deadline passed".to_string(),
            });
        };

        progress.ensure_live()?;
        progress
            .send_update(format!("Reading \"{}\"...", found.title))
            .await?;
        let fetched = progress
            .run_cancellable(with_timeout("paper fetch", wait, fetcher.fetch(&found)))
            .await;
        match fetched {
            Ok(content) => {
                pool.insert(found, content, iteration, ResourceOrigin::External);
                Ok(AttemptOutcome::Fetched)
            }
            Err(e) => {
                progress.ensure_live()?;
                pool.record_failure(&found, format!("{:#}", e), iteration);
                Ok(AttemptOutcome::FetchFailed {
                    reason: format!("{:#}", e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::gather::decision::{
        RawExternalPaper, RawExternalSuggestion, RawGatherDecision, RawRecommendation,
        RawSufficiency,
    };
    use crate::gather::DecisionSource;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    type DecideFn = Box<dyn Fn(&DecisionRequest) -> anyhow::Result<RawGatherDecision> + Send + Sync>;
    type ExternalFn =
        Box<dyn Fn(&ExternalRequest) -> anyhow::Result<RawExternalSuggestion> + Send + Sync>;

    struct ScriptedOracle {
        decide: DecideFn,
        sufficient: bool,
        external: ExternalFn,
        decide_requests: Mutex<Vec<DecisionRequest>>,
        external_requests: Mutex<Vec<ExternalRequest>>,
        assess_calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn deciding(decide: DecideFn) -> Self {
            Self {
                decide,
                sufficient: false,
                external: Box::new(|_| anyhow::bail!("no external script")),
                decide_requests: Mutex::new(Vec::new()),
                external_requests: Mutex::new(Vec::new()),
                assess_calls: AtomicUsize::new(0),
            }
        }

        fn suggesting(external: ExternalFn) -> Self {
            let mut oracle = Self::deciding(Box::new(|_| anyhow::bail!("no decide script")));
            oracle.external = external;
            oracle
        }
    }

    #[async_trait]
    impl DecisionOracle for ScriptedOracle {
        async fn decide(&self, request: &DecisionRequest) -> anyhow::Result<RawGatherDecision> {
            self.decide_requests.lock().unwrap().push(request.clone());
            (self.decide)(request)
        }

        async fn assess_sufficiency(
            &self,
            _request: &SufficiencyRequest,
        ) -> anyhow::Result<RawSufficiency> {
            self.assess_calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawSufficiency {
                is_sufficient: Some(self.sufficient),
                reason: None,
            })
        }

        async fn suggest_external(
            &self,
            request: &ExternalRequest,
        ) -> anyhow::Result<RawExternalSuggestion> {
            self.external_requests.lock().unwrap().push(request.clone());
            (self.external)(request)
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        failing: HashSet<String>,
        calls: AtomicUsize,
        cancel_on_fetch: Option<CancellationToken>,
    }

    #[async_trait]
    impl PaperFetcher for FakeFetcher {
        async fn fetch(&self, candidate: &ResourceCandidate) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            if self.failing.contains(&candidate.title) {
                anyhow::bail!("HTTP 404");
            }
            Ok(format!("full text of {}", candidate.title))
        }
    }

    struct FakeLookup {
        results: HashMap<String, ResourceCandidate>,
    }

    #[async_trait]
    impl TitleLookup for FakeLookup {
        async fn lookup_by_title(
            &self,
            title: &str,
            _keywords: &[String],
        ) -> anyhow::Result<Option<ResourceCandidate>> {
            if title.contains("broken") {
                anyhow::bail!("lookup service unavailable");
            }
            Ok(self.results.get(title).cloned())
        }
    }

    fn paper(title: &str, year: i32, pdf: bool) -> ResourceCandidate {
        ResourceCandidate {
            title: title.to_string(),
            year: Some(year),
            citation_count: Some(10),
            pdf_url: pdf.then(|| format!("https://papers.test/{}.pdf", normalize_title(title))),
            ..Default::default()
        }
    }

    fn seed(count: usize) -> Vec<ResourceCandidate> {
        (0..count)
            .map(|i| paper(&format!("Paper number {}", i), 2015 + i as i32, true))
            .collect()
    }

    fn recommend(titles: &[&str], should_continue: bool) -> RawGatherDecision {
        RawGatherDecision {
            papers_to_fetch: Some(
                titles
                    .iter()
                    .map(|t| RawRecommendation {
                        title: Some(t.to_string()),
                        reason: Some("relevant".to_string()),
                        priority: Some("high".to_string()),
                    })
                    .collect(),
            ),
            should_continue: Some(should_continue),
            ..Default::default()
        }
    }

    fn gatherer(capacity: usize, max_iterations: usize) -> AdaptiveGatherer {
        AdaptiveGatherer::new(
            GatherConfig {
                capacity,
                max_iterations,
                reference_year: Some(2025),
            },
            &TimeoutConfig::default(),
        )
    }

    fn progress(token: CancellationToken) -> (ProgressSender, mpsc::Receiver<String>) {
        ProgressSender::channel(token, 256)
    }

    #[tokio::test]
    async fn test_two_per_iteration_stops_at_capacity() {
        let oracle = ScriptedOracle::deciding(Box::new(|req| {
            let titles: Vec<&str> = req.candidates.iter().take(2).map(|c| c.title.as_str()).collect();
            Ok(recommend(&titles, true))
        }));
        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = gatherer(5, 5)
            .gather(seed(10), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.pool.fetched_count(), 5);
        assert_eq!(outcome.iterations(), 3);
        assert_eq!(outcome.stop_reason, StopReason::CapacityReached);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.history[2].fetched.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_oracle_falls_back_to_scoring() {
        let oracle = ScriptedOracle::deciding(Box::new(|_| anyhow::bail!("model unreachable")));
        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());
        let candidates = vec![
            paper("Old work", 2010, true),
            paper("No pdf", 2025, false),
            paper("Newest work", 2025, true),
            paper("Middle work", 2020, true),
        ];

        let outcome = gatherer(5, 5)
            .gather(candidates, &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(
            outcome.pool.fetched_titles(),
            vec!["Newest work", "Middle work", "Old work"]
        );
        assert_eq!(outcome.history[0].decision.source, DecisionSource::Fallback);
        assert!(outcome.iterations() <= 5);
        assert_eq!(outcome.stop_reason, StopReason::OracleStopped);
        // No sufficiency round trip after the oracle already failed
        assert_eq!(oracle.assess_calls.load(Ordering::SeqCst), 0);
        assert!(outcome.history.iter().all(|h| h.sufficiency.is_none()));
    }

    #[tokio::test]
    async fn test_oracle_decisions_still_get_sufficiency_checks() {
        let oracle = ScriptedOracle::deciding(Box::new(|req| {
            let titles: Vec<&str> = req.candidates.iter().take(1).map(|c| c.title.as_str()).collect();
            Ok(recommend(&titles, true))
        }));
        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = gatherer(5, 2)
            .gather(seed(4), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(oracle.assess_calls.load(Ordering::SeqCst), 2);
        assert!(outcome.history.iter().all(|h| h.sufficiency.is_some()));
    }

    struct HangingFetcher;

    #[async_trait]
    impl PaperFetcher for HangingFetcher {
        async fn fetch(&self, _: &ResourceCandidate) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_gathering_mid_iteration() {
        let oracle = ScriptedOracle::deciding(Box::new(|req| {
            let titles: Vec<&str> = req.candidates.iter().take(3).map(|c| c.title.as_str()).collect();
            Ok(recommend(&titles, true))
        }));
        let (progress, _rx) = progress(CancellationToken::new());
        let started = Instant::now();

        let outcome = gatherer(5, 5)
            .with_deadline(started + Duration::from_secs(45))
            .gather(seed(6), &GatherFocus::default(), &oracle, &HangingFetcher, &progress)
            .await
            .unwrap();

        // 30s fetch timeout, then the 15s left, then no time for a third
        assert_eq!(outcome.stop_reason, StopReason::Deadline);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].failed.len(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(45));
        assert_eq!(oracle.assess_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_oracle_times_out_into_fallback() {
        struct SlowOracle;

        #[async_trait]
        impl DecisionOracle for SlowOracle {
            async fn decide(&self, _: &DecisionRequest) -> anyhow::Result<RawGatherDecision> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RawGatherDecision::default())
            }
            async fn assess_sufficiency(
                &self,
                _: &SufficiencyRequest,
            ) -> anyhow::Result<RawSufficiency> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RawSufficiency::default())
            }
            async fn suggest_external(
                &self,
                _: &ExternalRequest,
            ) -> anyhow::Result<RawExternalSuggestion> {
                Ok(RawExternalSuggestion::default())
            }
        }

        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());
        let outcome = gatherer(2, 3)
            .gather(seed(4), &GatherFocus::default(), &SlowOracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.pool.fetched_count(), 2);
        assert_eq!(outcome.history[0].decision.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_unmatched_recommendation_is_skipped() {
        let oracle = ScriptedOracle::deciding(Box::new(|_| {
            Ok(recommend(
                &["Quantum chromodynamics lattice", "paper number 3"],
                false,
            ))
        }));
        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = gatherer(5, 5)
            .gather(seed(5), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.pool.fetched_titles(), vec!["Paper number 3"]);
        assert_eq!(
            outcome.history[0].unmatched,
            vec!["Quantum chromodynamics lattice"]
        );
        assert_eq!(outcome.stop_reason, StopReason::OracleStopped);
    }

    #[tokio::test]
    async fn test_repeated_recommendation_fetches_once() {
        let oracle = ScriptedOracle::deciding(Box::new(|_| {
            Ok(recommend(&["Paper number 1", "paper number 1!"], true))
        }));
        let fetcher = FakeFetcher::default();
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = gatherer(5, 3)
            .gather(seed(3), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.pool.fetched_count(), 1);
        assert_eq!(outcome.history[0].duplicates, vec!["Paper number 1"]);
        assert_eq!(outcome.stop_reason, StopReason::IterationBudget);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_excluded_from_later_iterations() {
        let oracle = ScriptedOracle::deciding(Box::new(|req| {
            let titles: Vec<&str> = req.candidates.iter().take(1).map(|c| c.title.as_str()).collect();
            Ok(recommend(&titles, true))
        }));
        let fetcher = FakeFetcher {
            failing: HashSet::from(["Paper number 0".to_string()]),
            ..Default::default()
        };
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = gatherer(2, 5)
            .gather(seed(4), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.pool.failures().len(), 1);
        assert_eq!(outcome.history[0].failed, vec!["Paper number 0"]);
        let requests = oracle.decide_requests.lock().unwrap();
        assert!(requests[1..]
            .iter()
            .all(|r| r.candidates.iter().all(|c| c.title != "Paper number 0")));
        assert_eq!(outcome.pool.fetched_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_mid_iteration() {
        let token = CancellationToken::new();
        let oracle = ScriptedOracle::deciding(Box::new(|req| {
            let titles: Vec<&str> = req.candidates.iter().take(3).map(|c| c.title.as_str()).collect();
            Ok(recommend(&titles, true))
        }));
        let fetcher = FakeFetcher {
            cancel_on_fetch: Some(token.clone()),
            ..Default::default()
        };
        let (progress, _rx) = progress(token);

        let err = gatherer(5, 5)
            .gather(seed(6), &GatherFocus::default(), &oracle, &fetcher, &progress)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Cancelled)
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    fn external(capacity: usize, max_iterations: usize) -> ExternalSearch {
        ExternalSearch::new(
            ExternalSearchConfig {
                enabled: true,
                capacity,
                max_iterations,
                parallel_lookups: 3,
            },
            &TimeoutConfig::default(),
        )
    }

    fn suggest(titles: &[&str], should_continue: bool) -> RawExternalSuggestion {
        RawExternalSuggestion {
            papers: Some(
                titles
                    .iter()
                    .map(|t| RawExternalPaper {
                        title: Some(t.to_string()),
                        keywords: None,
                        reason: None,
                    })
                    .collect(),
            ),
            should_continue: Some(should_continue),
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn test_external_search_feeds_back_attempts() {
        let oracle = ScriptedOracle::suggesting(Box::new(|req| {
            if req.iteration == 1 {
                Ok(suggest(&["Missing Paper", "broken lookup"], true))
            } else {
                Ok(suggest(
                    &["Missing Paper", "Neural ODEs", "Deep Equilibrium Models"],
                    true,
                ))
            }
        }));
        let lookup = FakeLookup {
            results: HashMap::from([
                ("Neural ODEs".to_string(), paper("Neural Ordinary Differential Equations", 2018, true)),
                ("Deep Equilibrium Models".to_string(), paper("Deep Equilibrium Models", 2019, true)),
            ]),
        };
        let fetcher = FakeFetcher::default();
        let known = ResourcePool::new(seed(2), 5);
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = external(2, 3)
            .search(&known, &GatherFocus::default(), Vec::new(), &oracle, &lookup, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(
            outcome.pool.fetched_titles(),
            vec!["Neural Ordinary Differential Equations", "Deep Equilibrium Models"]
        );
        assert_eq!(outcome.stop_reason, StopReason::CapacityReached);
        assert_eq!(outcome.iterations, 2);

        let requests = oracle.external_requests.lock().unwrap();
        assert_eq!(requests[1].previous_attempts.len(), 2);
        assert_eq!(requests[1].previous_attempts[0].outcome, AttemptOutcome::NotFound);
        assert!(matches!(
            requests[1].previous_attempts[1].outcome,
            AttemptOutcome::LookupFailed { .. }
        ));
        assert_eq!(outcome.attempts[2].outcome, AttemptOutcome::AlreadyKnown);
        assert_eq!(outcome.attempts[3].outcome, AttemptOutcome::Fetched);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_search_respects_shared_deadline() {
        let oracle = ScriptedOracle::suggesting(Box::new(|_| Ok(suggest(&["Neural ODEs"], true))));
        let lookup = FakeLookup {
            results: HashMap::new(),
        };
        let fetcher = FakeFetcher::default();
        let known = ResourcePool::new(seed(2), 5);
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = external(2, 3)
            .with_deadline(Instant::now())
            .search(&known, &GatherFocus::default(), Vec::new(), &oracle, &lookup, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Deadline);
        assert_eq!(outcome.iterations, 0);
        assert!(oracle.external_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_external_oracle_failure_stops_search() {
        let oracle = ScriptedOracle::suggesting(Box::new(|_| anyhow::bail!("rate limited")));
        let lookup = FakeLookup {
            results: HashMap::new(),
        };
        let fetcher = FakeFetcher::default();
        let known = ResourcePool::new(seed(2), 5);
        let (progress, _rx) = progress(CancellationToken::new());

        let outcome = external(2, 3)
            .search(&known, &GatherFocus::default(), Vec::new(), &oracle, &lookup, &fetcher, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::OracleFailed);
        assert_eq!(outcome.pool.fetched_count(), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
