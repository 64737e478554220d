//! LLM provider factory.
//!
//! Builds an `LlmClient` from the configured provider name and endpoint.

use crate::client::LlmClient;
use crate::providers::{MockLlmClient, OllamaClient};
use crate::types::ProviderType;
use groundwork_core::{AppError, AppResult, LlmSettings};
use std::sync::Arc;

/// Create an LLM client from gateway settings.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the HTTP client
/// cannot be built.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!(
            "Unknown LLM provider: {}. Supported: ollama, mock",
            settings.provider
        ))
    })?;

    match provider {
        ProviderType::Ollama => {
            let client = OllamaClient::with_base_url(&settings.endpoint)?;
            Ok(Arc::new(client))
        }
        // An empty script answers every call with a transport error, so
        // callers exercise their fallback paths.
        ProviderType::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
