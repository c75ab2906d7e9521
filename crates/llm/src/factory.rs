//! LLM provider factory.
//!
//! Creates generation clients from application configuration: provider
//! resolution, endpoint selection and timeout injection.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use feedmind_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout_secs` - Optional timeout for non-streaming completions
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout_secs: Option<u64>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            let mut client = OllamaClient::with_base_url(base_url);
            if let Some(secs) = timeout_secs {
                client = client.with_timeout(secs);
            }
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
