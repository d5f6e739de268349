//! # Web Context
//!
//! Bounded browsing for facts the academic APIs miss: a contact email and
//! stated research interests. Search result pages come from DuckDuckGo's
//! HTML endpoint; only pages on allowed domains are visited, each visit
//! costs one step, and the whole pass stops at the step budget or deadline.

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

use super::http::ClientHandle;
use crate::config::WebContextConfig;
use crate::tools::text::{dedupe_strings, strip_html, truncate_chars, unescape_entities};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const PAGE_TEXT_CHARS: usize = 8000;
const SNIPPET_CHARS: usize = 700;
const MAX_INTERESTS: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebContext {
    pub sources: Vec<String>,
    pub snippets: Vec<String>,
    pub email: Option<String>,
    pub research_interests: Vec<String>,
    pub web_steps_used: usize,
    pub allowed_domains_used: Vec<String>,
}

/// Guess `<slug>.edu` from a university name ("Stanford University" -> "stanford.edu").
pub fn guess_university_domain(university: &str) -> Option<String> {
    let slug: String = university
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let slug = slug.replace("university", "");
    if slug.is_empty() {
        None
    } else {
        Some(format!("{}.edu", slug))
    }
}

/// Result links point through a DuckDuckGo redirect; the target is in `uddg`.
pub fn extract_real_url(raw: &str) -> Option<String> {
    let raw = if raw.starts_with("//") {
        format!("https:{}", raw)
    } else {
        raw.to_string()
    };
    if !raw.starts_with("http") {
        return None;
    }
    let parsed = Url::parse(&raw).ok()?;
    let host = parsed.host_str().unwrap_or_default();
    if !host.contains("duckduckgo.com") {
        return Some(raw);
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, value)| value.into_owned())
}

pub fn is_allowed_url(url: &str, allowed_domains: &[String]) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };
    allowed_domains.iter().any(|allowed| {
        let allowed = allowed.to_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed)) || host.ends_with(&allowed)
    })
}

/// Unique result links from a search page, redirects unwrapped.
pub fn extract_result_links(html: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let href = HREF.get_or_init(|| Regex::new(r#"(?i)href="([^"]+)""#).expect("valid regex"));

    let mut seen = HashSet::new();
    href.captures_iter(html)
        .filter_map(|cap| extract_real_url(&unescape_entities(&cap[1])))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub fn extract_emails(text: &str) -> Vec<String> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let email = EMAIL.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex")
    });
    email.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// "Research interests: ..." style phrases, deduplicated, at most eight.
pub fn extract_research_interests(text: &str) -> Vec<String> {
    static INTERESTS: OnceLock<Regex> = OnceLock::new();
    let interests = INTERESTS.get_or_init(|| {
        Regex::new(r"(?i)research(?:\s+interests?|\s+areas?)[:\-]\s*[^.]{20,220}")
            .expect("valid regex")
    });
    let phrases = interests.find_iter(text).map(|m| {
        m.as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c| c == ' ' || c == '-' || c == ':')
            .to_string()
    });
    let mut found = dedupe_strings(phrases);
    found.truncate(MAX_INTERESTS);
    found
}

pub struct WebBrowser {
    http: Arc<ClientHandle>,
    config: WebContextConfig,
}

impl WebBrowser {
    pub fn new(http: Arc<ClientHandle>, config: WebContextConfig) -> Self {
        Self { http, config }
    }

    /// Allowed domains for one run: configured, preferred, then the guessed university domain.
    pub fn allowed_domains(&self, university: &str, preferred: &[String]) -> Vec<String> {
        let mut domains = self.config.allowed_domains.clone();
        let extra = preferred
            .iter()
            .map(|d| d.trim().to_lowercase())
            .chain(guess_university_domain(university));
        for domain in extra {
            if !domain.is_empty() && !domains.contains(&domain) {
                domains.push(domain);
            }
        }
        domains
    }

    /// Wall-clock bound for one `gather` call
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(5))
    }

    pub async fn gather(
        &self,
        professor_name: &str,
        university: &str,
        preferred_domains: &[String],
    ) -> WebContext {
        let allowed = self.allowed_domains(university, preferred_domains);
        let queries = [
            format!("\"{}\" \"{}\" faculty profile", professor_name, university),
            format!("\"{}\" \"{}\" lab", professor_name, university),
            format!("\"{}\" \"{}\" research interests", professor_name, university),
        ];

        let max_steps = self.config.max_steps;
        let deadline = Instant::now() + self.budget();

        let mut sources = Vec::new();
        let mut snippets = Vec::new();
        let mut emails = Vec::new();
        let mut interests = Vec::new();
        let mut seen = HashSet::new();
        let mut steps = 0usize;

        'queries: for query in &queries {
            if steps >= max_steps || Instant::now() >= deadline {
                break;
            }
            let search_url = format!("{}?q={}", SEARCH_ENDPOINT, urlencoding::encode(query));
            let remaining = deadline.saturating_duration_since(Instant::now());
            let html = match self.http.get_text(&search_url, remaining).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::debug!(error = %e, "Web search request failed");
                    continue;
                }
            };

            for link in extract_result_links(&html) {
                if steps >= max_steps || Instant::now() >= deadline {
                    break 'queries;
                }
                if !seen.insert(link.clone()) || !is_allowed_url(&link, &allowed) {
                    continue;
                }

                steps += 1;
                let remaining = deadline.saturating_duration_since(Instant::now());
                let page = match self.http.get_text(&link, remaining).await {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::debug!(url = %link, error = %e, "Page fetch failed");
                        continue;
                    }
                };
                let stripped = strip_html(&page);
                let text = truncate_chars(&stripped, PAGE_TEXT_CHARS);
                if text.is_empty() {
                    continue;
                }

                emails.extend(extract_emails(text));
                interests.extend(extract_research_interests(text));
                snippets.push(truncate_chars(text, SNIPPET_CHARS).to_string());
                sources.push(link);
            }
        }

        tracing::info!(steps, sources = sources.len(), "Web context gathered");

        snippets.truncate(max_steps);
        let mut research_interests = dedupe_strings(interests);
        research_interests.truncate(MAX_INTERESTS);

        WebContext {
            sources: dedupe_strings(sources),
            snippets,
            email: dedupe_strings(emails).into_iter().next(),
            research_interests,
            web_steps_used: steps,
            allowed_domains_used: allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_guess_university_domain() {
        assert_eq!(
            guess_university_domain("Stanford University").as_deref(),
            Some("stanford.edu")
        );
        assert_eq!(guess_university_domain("University"), None);
        assert_eq!(guess_university_domain("  "), None);
    }

    #[test]
    fn test_extract_real_url_unwraps_redirect() {
        let raw = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fcs.stanford.edu%2F~prof&rut=abc";
        assert_eq!(
            extract_real_url(raw).as_deref(),
            Some("https://cs.stanford.edu/~prof")
        );
        assert_eq!(
            extract_real_url("https://arxiv.org/abs/1").as_deref(),
            Some("https://arxiv.org/abs/1")
        );
        assert_eq!(extract_real_url("/relative"), None);
        assert_eq!(extract_real_url("https://duckduckgo.com/about"), None);
    }

    #[test]
    fn test_extract_result_links_dedupes() {
        let html = r#"
            <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fa.edu%2Fx&amp;rut=1">A</a>
            <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fa.edu%2Fx&amp;rut=2">A again</a>
            <a href="https://b.ac.uk/y">B</a>
            <a href="/settings">skip</a>
        "#;
        assert_eq!(
            extract_result_links(html),
            vec!["https://a.edu/x".to_string(), "https://b.ac.uk/y".to_string()]
        );
    }

    #[test]
    fn test_is_allowed_url() {
        let allowed = domains(&["edu", "arxiv.org"]);
        assert!(is_allowed_url("https://cs.mit.edu/people", &allowed));
        assert!(is_allowed_url("https://arxiv.org/abs/1", &allowed));
        assert!(!is_allowed_url("https://linkedin.com/in/x", &allowed));
        assert!(!is_allowed_url("not a url", &allowed));
    }

    #[test]
    fn test_extract_emails_and_interests() {
        let text = "Contact: jdoe@cs.stanford.edu. Research interests: probabilistic \
                    machine learning and causal inference for healthcare. More text.";
        assert_eq!(extract_emails(text), vec!["jdoe@cs.stanford.edu"]);

        let interests = extract_research_interests(text);
        assert_eq!(interests.len(), 1);
        assert!(interests[0].starts_with("Research interests: probabilistic"));
    }

    #[test]
    fn test_allowed_domains_adds_guess_once() {
        let browser = WebBrowser::new(
            Arc::new(ClientHandle::default()),
            WebContextConfig {
                allowed_domains: domains(&["edu"]),
                ..Default::default()
            },
        );
        let allowed = browser.allowed_domains("MIT", &["mit.edu".to_string(), " ".to_string()]);
        assert_eq!(allowed, domains(&["edu", "mit.edu"]));
    }
}
