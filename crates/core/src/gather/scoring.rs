//! Deterministic ranking used when the decision oracle is unavailable.

use super::decision::{DecisionSource, GatherDecision, Priority, Recommendation};
use super::pool::ResourceCandidate;

const RECENCY_WEIGHT: f64 = 0.6;
const CITATION_WEIGHT: f64 = 0.4;
/// Papers older than this many years score zero recency
const RECENCY_HORIZON_YEARS: f64 = 10.0;
/// Citation count at which the citation component saturates
const CITATION_SATURATION: f64 = 1000.0;

/// 0.6 x recency + 0.4 x log-scaled citations, both in [0, 1].
pub fn fallback_score(candidate: &ResourceCandidate, reference_year: i32) -> f64 {
    let recency = match candidate.year {
        Some(year) if year > 0 => {
            let age = (reference_year - year).max(0) as f64;
            (1.0 - age / RECENCY_HORIZON_YEARS).max(0.0)
        }
        _ => 0.0,
    };

    let citations = candidate.citation_count.unwrap_or(0) as f64;
    let citation = ((1.0 + citations).ln() / (1.0 + CITATION_SATURATION).ln()).min(1.0);

    RECENCY_WEIGHT * recency + CITATION_WEIGHT * citation
}

/// Top `limit` fetchable candidates by [`fallback_score`]. Ties keep
/// candidate order.
pub fn rank_fetchable(
    candidates: &[ResourceCandidate],
    reference_year: i32,
    limit: usize,
) -> Vec<&ResourceCandidate> {
    let mut scored: Vec<(f64, &ResourceCandidate)> = candidates
        .iter()
        .filter(|c| c.is_fetchable())
        .map(|c| (fallback_score(c, reference_year), c))
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

/// Decision built from [`rank_fetchable`]; continues only if it picked something.
pub fn fallback_decision(
    candidates: &[ResourceCandidate],
    reference_year: i32,
    remaining_slots: usize,
) -> GatherDecision {
    let fetch: Vec<Recommendation> = rank_fetchable(candidates, reference_year, remaining_slots)
        .into_iter()
        .map(|c| Recommendation {
            title: c.title.clone(),
            rationale: format!(
                "Ranked by recency and citations (score {:.2})",
                fallback_score(c, reference_year)
            ),
            priority: Priority::Medium,
        })
        .collect();

    GatherDecision {
        should_continue: !fetch.is_empty(),
        fetch,
        skip: Vec::new(),
        search_hints: Vec::new(),
        reasoning: "Decision oracle unavailable; ranked candidates by recency and citations."
            .to_string(),
        source: DecisionSource::Fallback,
    }
}
