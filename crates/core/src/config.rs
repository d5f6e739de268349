//! # Coordinator Configuration
//!
//! Budgets, timeouts and model selection for one pipeline run. Values come
//! from [`CoordinatorConfig::default`] and can be overridden from the
//! environment with [`CoordinatorConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{LlmProvider, ModelConfig};

/// Default domains web browsing may visit
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "edu",
    "ac.uk",
    "ac.jp",
    "ac.in",
    "openalex.org",
    "semanticscholar.org",
    "arxiv.org",
    "aclanthology.org",
];

/// Academic metadata source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AcademicApi {
    OpenAlex,
    SemanticScholar,
}

impl AcademicApi {
    pub fn parse(value: &str) -> Option<AcademicApi> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "openalex" | "open_alex" => Some(AcademicApi::OpenAlex),
            "semantic_scholar" | "semanticscholar" | "s2" => Some(AcademicApi::SemanticScholar),
            _ => None,
        }
    }
}

/// Budget for the seeded adaptive gathering loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatherConfig {
    /// Hard ceiling on successful fetches
    pub capacity: usize,
    /// Maximum decision iterations
    pub max_iterations: usize,
    /// Year recency is measured against; current UTC year when unset
    #[serde(default)]
    pub reference_year: Option<i32>,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            max_iterations: 5,
            reference_year: None,
        }
    }
}

/// Budget for the out-of-seed search loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalSearchConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub max_iterations: usize,
    /// Title lookups issued concurrently within one iteration
    pub parallel_lookups: usize,
}

impl Default for ExternalSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 2,
            max_iterations: 3,
            parallel_lookups: 3,
        }
    }
}

/// Limits for professor web browsing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebContextConfig {
    pub max_steps: usize,
    pub timeout_secs: u64,
    pub allowed_domains: Vec<String>,
}

impl Default for WebContextConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            timeout_secs: 90,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Bounded waits for every external call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    pub oracle_secs: u64,
    pub fetch_secs: u64,
    pub search_secs: u64,
    pub image_secs: u64,
    pub stage_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            oracle_secs: 90,
            fetch_secs: 30,
            search_secs: 25,
            image_secs: 45,
            stage_secs: 600,
        }
    }
}

impl TimeoutConfig {
    pub fn oracle(&self) -> Duration {
        Duration::from_secs(self.oracle_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }

    pub fn stage(&self) -> Duration {
        Duration::from_secs(self.stage_secs)
    }

    /// Wall-clock budget for paper gathering: four fifths of the stage
    /// timeout, leaving room to build the selection.
    pub fn gather_budget(&self) -> Duration {
        self.stage() * 4 / 5
    }
}

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Global LLM provider (default: Gemini)
    #[serde(default)]
    pub global_provider: LlmProvider,
    /// Global model to use for all stages
    pub global_model: Option<String>,
    /// Base URL override for LLM API (for OpenAI-compatible endpoints)
    pub base_url: Option<String>,
    /// Per-stage model overrides (stage id -> model name)
    #[serde(default)]
    pub per_agent_models: HashMap<String, String>,
    /// Per-stage provider overrides (stage id -> provider)
    #[serde(default)]
    pub per_agent_providers: HashMap<String, LlmProvider>,
    /// Per-stage base URL overrides (stage id -> base_url, for OpenAI)
    #[serde(default)]
    pub per_agent_base_urls: HashMap<String, String>,
    #[serde(default)]
    pub gather: GatherConfig,
    #[serde(default)]
    pub external_search: ExternalSearchConfig,
    #[serde(default)]
    pub web: WebContextConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Order in which academic APIs are tried
    pub academic_api_order: Vec<AcademicApi>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            global_provider: LlmProvider::Gemini,
            global_model: None,
            base_url: None,
            per_agent_models: HashMap::new(),
            per_agent_providers: HashMap::new(),
            per_agent_base_urls: HashMap::new(),
            gather: GatherConfig::default(),
            external_search: ExternalSearchConfig::default(),
            web: WebContextConfig::default(),
            timeouts: TimeoutConfig::default(),
            academic_api_order: vec![AcademicApi::OpenAlex, AcademicApi::SemanticScholar],
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("LLM_PROVIDER") {
            match LlmProvider::parse(&raw) {
                Some(provider) => config.global_provider = provider,
                None => tracing::warn!(value = %raw, "Unknown LLM_PROVIDER, keeping default"),
            }
        }
        config.global_model = get("AUTOGEN_MODEL");
        config.base_url = get("GEMINI_OPENAI_BASE_URL");

        parse_into(&get, "WEB_MAX_STEPS", &mut config.web.max_steps);
        parse_into(&get, "WEB_TIMEOUT_SECONDS", &mut config.web.timeout_secs);
        parse_into(&get, "PAPER_CAPACITY", &mut config.gather.capacity);
        parse_into(&get, "PAPER_MAX_ITERATIONS", &mut config.gather.max_iterations);
        parse_into(&get, "EXTERNAL_PAPER_CAPACITY", &mut config.external_search.capacity);
        parse_into(
            &get,
            "EXTERNAL_MAX_ITERATIONS",
            &mut config.external_search.max_iterations,
        );

        if let Some(raw) = get("WEB_ALLOWED_DOMAINS") {
            let domains: Vec<String> = raw
                .split(',')
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            if !domains.is_empty() {
                config.web.allowed_domains = domains;
            }
        }

        if let Some(raw) = get("ACADEMIC_API_ORDER") {
            let order: Vec<AcademicApi> = raw.split(',').filter_map(AcademicApi::parse).collect();
            if order.is_empty() {
                tracing::warn!(value = %raw, "ACADEMIC_API_ORDER names no known API, keeping default");
            } else {
                config.academic_api_order = order;
            }
        }

        config
    }

    /// Get model config for a specific stage
    pub fn model_config(&self, stage_id: &str) -> ModelConfig {
        // Provider: per-stage override -> global
        let provider = self
            .per_agent_providers
            .get(stage_id)
            .copied()
            .unwrap_or(self.global_provider);

        // Model: per-stage override -> global -> default for provider
        let model = self
            .per_agent_models
            .get(stage_id)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        // Base URL: per-stage override -> global (only for OpenAI)
        let base_url = if provider.supports_base_url() {
            self.per_agent_base_urls
                .get(stage_id)
                .or(self.base_url.as_ref())
                .cloned()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
        }
    }
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T)
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring malformed config value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_coordinator_config_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.gather.capacity, 5);
        assert_eq!(config.gather.max_iterations, 5);
        assert_eq!(config.web.max_steps, 6);
        assert_eq!(config.academic_api_order[0], AcademicApi::OpenAlex);
    }

    #[test]
    fn test_env_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            ("AUTOGEN_MODEL", "gemini-1.5-pro"),
            ("WEB_MAX_STEPS", "3"),
            ("PAPER_CAPACITY", "not-a-number"),
            ("WEB_ALLOWED_DOMAINS", "MIT.edu, ,ox.ac.uk"),
            ("ACADEMIC_API_ORDER", "semantic_scholar,openalex"),
        ]));

        assert_eq!(config.global_model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(config.web.max_steps, 3);
        assert_eq!(config.gather.capacity, 5);
        assert_eq!(config.web.allowed_domains, vec!["mit.edu", "ox.ac.uk"]);
        assert_eq!(
            config.academic_api_order,
            vec![AcademicApi::SemanticScholar, AcademicApi::OpenAlex]
        );
    }

    #[test]
    fn test_per_stage_model_override() {
        let mut config = CoordinatorConfig::default();
        config.global_model = Some("gemini-2.0-flash".to_string());
        config
            .per_agent_providers
            .insert("email_writer".to_string(), LlmProvider::OpenAI);
        config
            .per_agent_models
            .insert("email_writer".to_string(), "gpt-4o-mini".to_string());
        config.base_url = Some("https://example.test/v1/".to_string());

        let email = config.model_config("email_writer");
        assert_eq!(email.provider, LlmProvider::OpenAI);
        assert_eq!(email.model, "gpt-4o-mini");
        assert_eq!(email.base_url.as_deref(), Some("https://example.test/v1/"));

        let parser = config.model_config("cv_parser");
        assert_eq!(parser.provider, LlmProvider::Gemini);
        assert_eq!(parser.model, "gemini-2.0-flash");
        assert!(parser.base_url.is_none());
    }
}
