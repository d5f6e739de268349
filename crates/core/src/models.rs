//! # PhDApply Models
//!
//! Which LLM answers for a stage. The coordinator resolves one
//! [`ModelConfig`] per stage (see `CoordinatorConfig::model_config`) and
//! [`crate::run_llm_function!`] dispatches on its provider.
//!
//! radkit providers read their key from the environment (`GEMINI_API_KEY`,
//! `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OPENROUTER_API_KEY`,
//! `XAI_API_KEY`, `DEEPSEEK_API_KEY`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    /// Any OpenAI-compatible endpoint, including Gemini's `/openai/` surface
    #[serde(rename = "openai")]
    OpenAI,
    #[default]
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

/// (provider, id, display name, fallback model)
const PROVIDERS: [(LlmProvider, &str, &str, &str); 6] = [
    (LlmProvider::Anthropic, "anthropic", "Anthropic", "claude-sonnet-4-20250514"),
    (LlmProvider::OpenAI, "openai", "OpenAI", "gpt-4o-mini"),
    (LlmProvider::Gemini, "gemini", "Gemini", "gemini-2.0-flash"),
    (LlmProvider::OpenRouter, "openrouter", "OpenRouter", "google/gemini-2.0-flash-001"),
    (LlmProvider::Grok, "grok", "Grok", "grok-2"),
    (LlmProvider::DeepSeek, "deepseek", "DeepSeek", "deepseek-chat"),
];

impl LlmProvider {
    fn entry(&self) -> (LlmProvider, &'static str, &'static str, &'static str) {
        PROVIDERS
            .iter()
            .copied()
            .find(|(provider, ..)| provider == self)
            .unwrap_or(PROVIDERS[2])
    }

    /// Accepts the ids used by `LLM_PROVIDER`, case-insensitively.
    pub fn parse(value: &str) -> Option<LlmProvider> {
        let value = value.trim();
        PROVIDERS
            .iter()
            .find(|(_, id, ..)| id.eq_ignore_ascii_case(value))
            .map(|(provider, ..)| *provider)
    }

    pub fn display_name(&self) -> &'static str {
        self.entry().2
    }

    /// Model used when neither a stage override nor `AUTOGEN_MODEL` is set
    pub fn default_model(&self) -> &'static str {
        self.entry().3
    }

    /// Only the OpenAI-compatible client takes a base URL.
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

/// One resolved model choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Set only for OpenAI-compatible providers
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = LlmProvider::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: None,
        }
    }
}
