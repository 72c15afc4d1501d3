//! LLM integration for Artisan Assist.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait. Every provider
//! built by [`create_provider`] is wrapped in a retry layer and a per-call
//! timeout.

mod costs;
pub mod json;
pub mod provider;
pub(crate) mod retry;
mod rig_adapter;
pub mod timeout;

pub use provider::*;
pub use retry::RetryProvider;
pub use rig_adapter::RigAdapter;
pub use timeout::TimeoutProvider;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Deadline for a single completion attempt.
    pub timeout: Duration,
    /// Retries for transient failures (0 disables retrying).
    pub max_retries: u32,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let base = match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config)?,
        LlmBackend::OpenAi => create_openai_provider(config)?,
    };
    let timed: Arc<dyn LlmProvider> = Arc::new(TimeoutProvider::new(base, config.timeout));
    Ok(Arc::new(RetryProvider::new(timed, config.max_retries)))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

/// Run a system + user prompt and return the trimmed text.
pub async fn complete_text(
    llm: &dyn LlmProvider,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String, LlmError> {
    let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);
    let response = llm.complete(request).await?;
    let (input_cost, output_cost) = llm.cost_per_token();
    let cost = input_cost * rust_decimal::Decimal::from(response.input_tokens)
        + output_cost * rust_decimal::Decimal::from(response.output_tokens);
    tracing::debug!(
        model = llm.model_name(),
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        cost = %cost,
        "LLM completion"
    );
    Ok(response.content.trim().to_string())
}
