//! # Gather Decisions
//!
//! The oracle answers in loosely structured JSON. Every field of the raw
//! types is optional; [`GatherDecision`], [`SufficiencyVerdict`] and
//! [`ExternalSuggestion`] are the repaired forms the loops act on. Missing
//! lists become empty and missing booleans become `false`.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One recommendation as the oracle wrote it
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawRecommendation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// high, medium or low
    #[serde(default)]
    pub priority: Option<String>,
}

/// One skip note as the oracle wrote it
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawSkip {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Oracle output for one gathering iteration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawGatherDecision {
    #[serde(default)]
    pub papers_to_fetch: Option<Vec<RawRecommendation>>,
    #[serde(default)]
    pub papers_to_skip: Option<Vec<RawSkip>>,
    #[serde(default)]
    pub should_continue: Option<bool>,
    /// Topics worth searching for outside the candidate list
    #[serde(default)]
    pub search_hints: Option<Vec<String>>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Oracle output for the "is this enough" check
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawSufficiency {
    #[serde(default)]
    pub is_sufficient: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawExternalPaper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Oracle output for one external-search iteration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
#[serde(rename_all = "camelCase")]
pub struct RawExternalSuggestion {
    #[serde(default)]
    pub papers: Option<Vec<RawExternalPaper>>,
    #[serde(default)]
    pub should_continue: Option<bool>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Lenient parse; anything unrecognized is medium.
    pub fn parse_lossy(value: Option<&str>) -> Priority {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub rationale: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkipNote {
    pub title: String,
    pub rationale: String,
}

/// Who produced a decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Oracle,
    Fallback,
}

/// A repaired gathering decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatherDecision {
    pub fetch: Vec<Recommendation>,
    pub skip: Vec<SkipNote>,
    pub should_continue: bool,
    pub search_hints: Vec<String>,
    pub reasoning: String,
    pub source: DecisionSource,
}

impl From<RawGatherDecision> for GatherDecision {
    fn from(raw: RawGatherDecision) -> Self {
        let fetch = raw
            .papers_to_fetch
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let title = non_empty(r.title)?;
                Some(Recommendation {
                    title,
                    rationale: r.reason.unwrap_or_default().trim().to_string(),
                    priority: Priority::parse_lossy(r.priority.as_deref()),
                })
            })
            .collect();
        let skip = raw
            .papers_to_skip
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                Some(SkipNote {
                    title: non_empty(s.title)?,
                    rationale: s.reason.unwrap_or_default().trim().to_string(),
                })
            })
            .collect();

        Self {
            fetch,
            skip,
            should_continue: raw.should_continue.unwrap_or(false),
            search_hints: raw
                .search_hints
                .unwrap_or_default()
                .into_iter()
                .filter_map(|h| non_empty(Some(h)))
                .collect(),
            reasoning: raw.reasoning.unwrap_or_default(),
            source: DecisionSource::Oracle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SufficiencyVerdict {
    pub sufficient: bool,
    pub reason: String,
}

impl From<RawSufficiency> for SufficiencyVerdict {
    fn from(raw: RawSufficiency) -> Self {
        Self {
            sufficient: raw.is_sufficient.unwrap_or(false),
            reason: raw.reason.unwrap_or_default(),
        }
    }
}

/// A title to look up outside the seed candidates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalHint {
    pub title: String,
    pub keywords: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSuggestion {
    pub papers: Vec<ExternalHint>,
    pub should_continue: bool,
    pub reasoning: String,
}

impl From<RawExternalSuggestion> for ExternalSuggestion {
    fn from(raw: RawExternalSuggestion) -> Self {
        Self {
            papers: raw
                .papers
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| {
                    Some(ExternalHint {
                        title: non_empty(p.title)?,
                        keywords: p
                            .keywords
                            .unwrap_or_default()
                            .into_iter()
                            .filter_map(|k| non_empty(Some(k)))
                            .collect(),
                        rationale: p.reason.unwrap_or_default(),
                    })
                })
                .collect(),
            should_continue: raw.should_continue.unwrap_or(false),
            reasoning: raw.reasoning.unwrap_or_default(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
