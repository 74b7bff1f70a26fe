//! Language-model clients for categorization requests

pub mod client;
pub mod dummy;
pub mod openai;

use std::sync::Arc;

use orbit_config::Config;
use orbit_core::{Error, Result};

pub use client::{CategorizationClient, CategorizationRequest, Completion};
pub use dummy::DummyClient;
pub use openai::OpenAiClient;

/// Client selected by configuration: the dummy client in test mode,
/// otherwise the chat-completions client with the configured key
pub fn build_client(config: &Config) -> Result<Arc<dyn CategorizationClient>> {
    if config.run.test_mode {
        tracing::info!("Test mode enabled, requests are answered locally");
        return Ok(Arc::new(DummyClient::new()));
    }

    let api_key = config.api_key().ok_or_else(|| {
        Error::InvalidConfig(format!(
            "API key not found in environment variable {}",
            config.api.api_key_env
        ))
    })?;

    Ok(Arc::new(OpenAiClient::new(&config.api, &config.model, api_key)?))
}
