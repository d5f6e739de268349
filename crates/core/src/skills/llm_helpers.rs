//! # LLM Helpers
//!
//! Provider dispatch for structured LLM calls, shared by the stages and the
//! decision oracle. Any failure to reach or parse the model surfaces as
//! [`PipelineError::Oracle`](crate::error::PipelineError::Oracle).

/// Run an `LlmFunction<$output_type>` against the provider named in a `ModelConfig`.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let input = $input;
        tracing::debug!(
            provider = config.provider.display_name(),
            model = %config.model,
            output = stringify!($output_type),
            "LLM call"
        );

        let outcome: anyhow::Result<$output_type> = async {
            match config.provider {
                LlmProvider::Anthropic => {
                    let llm = AnthropicLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::OpenAI => {
                    let mut llm = OpenAILlm::from_env(&config.model)?;
                    if let Some(base_url) = &config.base_url {
                        llm = llm.with_base_url(base_url);
                    }
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::Gemini => {
                    let llm = GeminiLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::OpenRouter => {
                    let llm = OpenRouterLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::Grok => {
                    let llm = GrokLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
                LlmProvider::DeepSeek => {
                    let llm = DeepSeekLlm::from_env(&config.model)?;
                    LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                        .run(input)
                        .await
                        .map_err(Into::into)
                }
            }
        }
        .await;

        outcome.map_err(|e| {
            anyhow::Error::from($crate::error::PipelineError::Oracle(format!("{:#}", e)))
        })
    }};
}
