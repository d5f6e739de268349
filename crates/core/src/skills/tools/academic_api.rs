//! # Academic API Clients
//!
//! Author search and title lookup against OpenAlex and Semantic Scholar.
//! Every work is normalized into a [`ResourceCandidate`]; a candidate only
//! carries a `pdf_url` when the API pointed at something that looks like
//! full text.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::http::ClientHandle;
use crate::config::AcademicApi;
use crate::gather::{ResourceCandidate, TitleLookup};
use crate::tools::titles::{normalize_title, overlap_score, MIN_OVERLAP_SCORE};

pub const OPENALEX_API: &str = "https://api.openalex.org";
pub const SEMANTIC_SCHOLAR_API: &str = "https://api.semanticscholar.org/graph/v1";

/// Papers kept per author after merging recent and most-cited works
pub const MAX_AUTHOR_PAPERS: usize = 12;

const S2_PAPER_FIELDS: &str =
    "title,year,abstract,venue,citationCount,url,openAccessPdf,authors,externalIds";

/// An author and their merged paper list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub name: String,
    pub author_id: String,
    pub affiliation: String,
    pub paper_count: u64,
    pub citation_count: u64,
    #[serde(default)]
    pub h_index: Option<u64>,
    pub papers: Vec<ResourceCandidate>,
    /// Where the profile was read from
    pub source: String,
}

#[async_trait]
pub trait AcademicSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_author(
        &self,
        name: &str,
        affiliation: Option<&str>,
    ) -> Result<Option<AuthorProfile>>;

    /// Free-text work search, best matches first
    async fn search_works(&self, query: &str) -> Result<Vec<ResourceCandidate>>;
}

// ============================================================================
// Normalization
// ============================================================================

/// Whether a URL plausibly serves a PDF rather than a landing page.
pub fn is_pdf_url(url: &str) -> bool {
    if !url.starts_with("http") {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".pdf")
        || lower.contains("arxiv.org/pdf/")
        || lower.contains("/pdf/")
        || lower.contains("/pdfs/")
}

/// Rebuild an abstract from OpenAlex's word -> positions index.
pub fn inverted_index_to_text(index: &Value) -> String {
    let Some(map) = index.as_object() else {
        return String::new();
    };
    let mut words: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    words.sort_by_key(|(pos, _)| *pos);
    words
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// OpenAlex work JSON into a candidate.
///
/// The PDF locator is taken from the best open-access location, then the
/// primary location, then the first other location that looks like a PDF.
pub fn normalize_openalex_work(work: &Value) -> ResourceCandidate {
    let pdf_url = [
        str_at(work, "/best_oa_location/pdf_url"),
        str_at(work, "/primary_location/pdf_url"),
    ]
    .into_iter()
    .flatten()
    .chain(
        work.get("locations")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|loc| str_at(loc, "/pdf_url")),
    )
    .find(|url| is_pdf_url(url))
    .map(str::to_string);

    let doi = str_at(work, "/doi").map(str::to_string);
    let url = doi.as_ref().map(|d| {
        if d.starts_with("http") {
            d.clone()
        } else {
            format!("https://doi.org/{}", d)
        }
    });

    let authors = work
        .get("authorships")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| str_at(a, "/author/display_name"))
        .map(str::to_string)
        .collect();

    ResourceCandidate {
        title: str_at(work, "/title").unwrap_or_default().to_string(),
        year: work
            .get("publication_year")
            .and_then(Value::as_i64)
            .filter(|y| *y > 0)
            .map(|y| y as i32),
        citation_count: work.get("cited_by_count").and_then(Value::as_u64),
        venue: str_at(work, "/primary_location/source/display_name").map(str::to_string),
        abstract_text: work
            .get("abstract_inverted_index")
            .map(inverted_index_to_text)
            .and_then(non_empty),
        url,
        pdf_url,
        authors,
        doi,
    }
}

/// Semantic Scholar paper JSON into a candidate.
pub fn normalize_s2_paper(paper: &Value) -> ResourceCandidate {
    let pdf_url = str_at(paper, "/openAccessPdf/url")
        .filter(|url| url.starts_with("http"))
        .map(str::to_string);
    let doi = str_at(paper, "/externalIds/DOI").map(str::to_string);

    ResourceCandidate {
        title: str_at(paper, "/title").unwrap_or_default().to_string(),
        year: paper
            .get("year")
            .and_then(Value::as_i64)
            .filter(|y| *y > 0)
            .map(|y| y as i32),
        citation_count: paper.get("citationCount").and_then(Value::as_u64),
        venue: str_at(paper, "/venue").map(str::to_string),
        abstract_text: str_at(paper, "/abstract").map(str::to_string),
        url: str_at(paper, "/url")
            .map(str::to_string)
            .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{}", d))),
        pdf_url,
        authors: paper
            .get("authors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|a| str_at(a, "/name"))
            .map(str::to_string)
            .collect(),
        doi,
    }
}

/// Concatenate paper lists, dropping untitled and repeated titles, keeping at most `limit`.
pub fn merge_by_title<I>(lists: I, limit: usize) -> Vec<ResourceCandidate>
where
    I: IntoIterator<Item = Vec<ResourceCandidate>>,
{
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|paper| {
            let key = normalize_title(&paper.title);
            !key.is_empty() && seen.insert(key)
        })
        .take(limit)
        .collect()
}

/// Pick the author whose institution mentions `affiliation`, else the first result.
pub fn pick_openalex_author<'a>(results: &'a [Value], affiliation: Option<&str>) -> Option<&'a Value> {
    let wanted = affiliation
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty());
    if let Some(wanted) = wanted {
        let matched = results.iter().find(|candidate| {
            let listed = candidate
                .get("last_known_institutions")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|inst| str_at(inst, "/display_name"));
            let single = str_at(candidate, "/last_known_institution/display_name");
            listed
                .chain(single)
                .any(|name| name.to_lowercase().contains(&wanted))
        });
        if matched.is_some() {
            return matched;
        }
    }
    results.first()
}

fn results_of(body: &Value, key: &str) -> Vec<Value> {
    body.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// ============================================================================
// OpenAlex
// ============================================================================

pub struct OpenAlexClient {
    http: Arc<ClientHandle>,
    base_url: String,
    timeout: Duration,
}

impl OpenAlexClient {
    pub fn new(http: Arc<ClientHandle>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: OPENALEX_API.to_string(),
            timeout,
        }
    }

    async fn works(&self, filter: &str, sort: &str) -> Result<Vec<ResourceCandidate>> {
        let body = self
            .http
            .get_json(
                &format!("{}/works", self.base_url),
                &[
                    ("filter", filter.to_string()),
                    ("sort", sort.to_string()),
                    ("per_page", MAX_AUTHOR_PAPERS.to_string()),
                ],
                self.timeout,
            )
            .await?;
        Ok(results_of(&body, "results")
            .iter()
            .map(normalize_openalex_work)
            .collect())
    }
}

#[async_trait]
impl AcademicSource for OpenAlexClient {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn search_author(
        &self,
        name: &str,
        affiliation: Option<&str>,
    ) -> Result<Option<AuthorProfile>> {
        let body = self
            .http
            .get_json(
                &format!("{}/authors", self.base_url),
                &[("search", name.to_string()), ("per_page", "10".to_string())],
                self.timeout,
            )
            .await?;
        let results = results_of(&body, "results");
        let Some(selected) = pick_openalex_author(&results, affiliation) else {
            return Ok(None);
        };
        let Some(author_id) = str_at(selected, "/id") else {
            return Ok(None);
        };

        let filter = format!("author.id:{}", author_id);
        let (recent, cited) = futures::join!(
            self.works(&filter, "publication_date:desc"),
            self.works(&filter, "cited_by_count:desc"),
        );
        let recent = recent.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "OpenAlex recent works unavailable");
            Vec::new()
        });
        let cited = cited.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "OpenAlex cited works unavailable");
            Vec::new()
        });
        let papers = merge_by_title([recent, cited], MAX_AUTHOR_PAPERS);

        let affiliation_name = str_at(selected, "/last_known_institution/display_name")
            .or_else(|| str_at(selected, "/last_known_institutions/0/display_name"))
            .or(affiliation)
            .unwrap_or("Unknown")
            .to_string();

        Ok(Some(AuthorProfile {
            name: str_at(selected, "/display_name").unwrap_or(name).to_string(),
            author_id: author_id.to_string(),
            affiliation: affiliation_name,
            paper_count: selected
                .get("works_count")
                .and_then(Value::as_u64)
                .unwrap_or(papers.len() as u64),
            citation_count: selected
                .get("cited_by_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            h_index: selected.pointer("/summary_stats/h_index").and_then(Value::as_u64),
            source: format!(
                "{}/authors/{}",
                self.base_url,
                author_id.rsplit('/').next().unwrap_or(author_id)
            ),
            papers,
        }))
    }

    async fn search_works(&self, query: &str) -> Result<Vec<ResourceCandidate>> {
        let body = self
            .http
            .get_json(
                &format!("{}/works", self.base_url),
                &[("search", query.to_string()), ("per_page", "8".to_string())],
                self.timeout,
            )
            .await?;
        Ok(results_of(&body, "results")
            .iter()
            .map(normalize_openalex_work)
            .collect())
    }
}

// ============================================================================
// Semantic Scholar
// ============================================================================

pub struct SemanticScholarClient {
    http: Arc<ClientHandle>,
    base_url: String,
    timeout: Duration,
}

impl SemanticScholarClient {
    pub fn new(http: Arc<ClientHandle>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: SEMANTIC_SCHOLAR_API.to_string(),
            timeout,
        }
    }
}

/// Prefer the author whose affiliations mention `affiliation`.
fn pick_s2_author<'a>(results: &'a [Value], affiliation: Option<&str>) -> Option<&'a Value> {
    let wanted = affiliation
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty());
    if let Some(wanted) = wanted {
        let matched = results.iter().find(|candidate| {
            candidate
                .get("affiliations")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .any(|name| name.to_lowercase().contains(&wanted))
        });
        if matched.is_some() {
            return matched;
        }
    }
    results.first()
}

#[async_trait]
impl AcademicSource for SemanticScholarClient {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    async fn search_author(
        &self,
        name: &str,
        affiliation: Option<&str>,
    ) -> Result<Option<AuthorProfile>> {
        let body = self
            .http
            .get_json(
                &format!("{}/author/search", self.base_url),
                &[
                    ("query", name.to_string()),
                    (
                        "fields",
                        "name,affiliations,paperCount,citationCount,hIndex".to_string(),
                    ),
                    ("limit", "10".to_string()),
                ],
                self.timeout,
            )
            .await?;
        let results = results_of(&body, "data");
        let Some(selected) = pick_s2_author(&results, affiliation) else {
            return Ok(None);
        };
        let Some(author_id) = str_at(selected, "/authorId") else {
            return Ok(None);
        };

        let papers_body = self
            .http
            .get_json(
                &format!("{}/author/{}/papers", self.base_url, author_id),
                &[
                    ("fields", S2_PAPER_FIELDS.to_string()),
                    ("limit", "100".to_string()),
                ],
                self.timeout,
            )
            .await?;
        let all: Vec<ResourceCandidate> = results_of(&papers_body, "data")
            .iter()
            .map(normalize_s2_paper)
            .collect();

        let mut recent = all.clone();
        recent.sort_by(|a, b| b.year.cmp(&a.year));
        let mut cited = all;
        cited.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        let half = MAX_AUTHOR_PAPERS / 2;
        let papers = merge_by_title(
            [
                recent.into_iter().take(half).collect(),
                cited.into_iter().take(MAX_AUTHOR_PAPERS).collect(),
            ],
            MAX_AUTHOR_PAPERS,
        );

        Ok(Some(AuthorProfile {
            name: str_at(selected, "/name").unwrap_or(name).to_string(),
            author_id: author_id.to_string(),
            affiliation: str_at(selected, "/affiliations/0")
                .or(affiliation)
                .unwrap_or("Unknown")
                .to_string(),
            paper_count: selected
                .get("paperCount")
                .and_then(Value::as_u64)
                .unwrap_or(papers.len() as u64),
            citation_count: selected
                .get("citationCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            h_index: selected.get("hIndex").and_then(Value::as_u64),
            source: format!("https://www.semanticscholar.org/author/{}", author_id),
            papers,
        }))
    }

    async fn search_works(&self, query: &str) -> Result<Vec<ResourceCandidate>> {
        let body = self
            .http
            .get_json(
                &format!("{}/paper/search", self.base_url),
                &[
                    ("query", query.to_string()),
                    ("fields", S2_PAPER_FIELDS.to_string()),
                    ("limit", "8".to_string()),
                ],
                self.timeout,
            )
            .await?;
        Ok(results_of(&body, "data")
            .iter()
            .map(normalize_s2_paper)
            .collect())
    }
}

// ============================================================================
// Ordered search
// ============================================================================

/// The configured academic sources, tried in order
pub struct AcademicSearch {
    sources: Vec<Arc<dyn AcademicSource>>,
}

impl AcademicSearch {
    pub fn new(sources: Vec<Arc<dyn AcademicSource>>) -> Self {
        Self { sources }
    }

    pub fn from_order(order: &[AcademicApi], http: Arc<ClientHandle>, timeout: Duration) -> Self {
        let sources = order
            .iter()
            .map(|api| -> Arc<dyn AcademicSource> {
                match api {
                    AcademicApi::OpenAlex => Arc::new(OpenAlexClient::new(http.clone(), timeout)),
                    AcademicApi::SemanticScholar => {
                        Arc::new(SemanticScholarClient::new(http.clone(), timeout))
                    }
                }
            })
            .collect();
        Self::new(sources)
    }

    /// First source that knows the author; failures fall through to the next source.
    pub async fn find_author(
        &self,
        name: &str,
        affiliation: Option<&str>,
    ) -> Option<AuthorProfile> {
        for source in &self.sources {
            match source.search_author(name, affiliation).await {
                Ok(Some(profile)) => {
                    tracing::info!(
                        source = source.name(),
                        papers = profile.papers.len(),
                        "Author profile found"
                    );
                    return Some(profile);
                }
                Ok(None) => tracing::debug!(source = source.name(), "Author not found"),
                Err(e) => tracing::warn!(source = source.name(), error = %e, "Author search failed"),
            }
        }
        None
    }
}

/// Best result with full text whose title covers at least
/// [`MIN_OVERLAP_SCORE`] of the wanted title's significant words.
pub fn best_title_match(title: &str, results: Vec<ResourceCandidate>) -> Option<ResourceCandidate> {
    let mut best: Option<(ResourceCandidate, f64)> = None;
    for candidate in results {
        if !candidate.is_fetchable() || candidate.title.trim().is_empty() {
            continue;
        }
        let score = overlap_score(title, &candidate.title);
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score >= MIN_OVERLAP_SCORE)
        .map(|(candidate, _)| candidate)
}

#[async_trait]
impl TitleLookup for AcademicSearch {
    async fn lookup_by_title(
        &self,
        title: &str,
        keywords: &[String],
    ) -> Result<Option<ResourceCandidate>> {
        let query = if keywords.is_empty() {
            title.to_string()
        } else {
            format!("{} {}", title, keywords.join(" "))
        };

        let mut failures = 0;
        let mut last_error = None;
        for source in &self.sources {
            match source.search_works(&query).await {
                Ok(results) => {
                    if let Some(found) = best_title_match(title, results) {
                        return Ok(Some(found));
                    }
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "Title lookup failed");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }
        // Only an all-sources outage is an error; otherwise the title is simply unknown
        match last_error {
            Some(e) if failures == self.sources.len() => Err(e),
            _ => Ok(None),
        }
    }
}
