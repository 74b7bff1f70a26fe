use std::time::{Duration, Instant};

use async_trait::async_trait;
use orbit_config::ApiConfig;
use orbit_core::{ApiUsage, Error, Result};
use serde::{Deserialize, Serialize};

use crate::client::{CategorizationClient, CategorizationRequest, Completion};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &ApiConfig, model: &str, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("orbit/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CategorizationClient for OpenAiClient {
    async fn categorize(&self, request: &CategorizationRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
        };

        tracing::info!(
            batch = request.batch_number,
            ideas = request.ids.len(),
            payload_kb = request.payload_bytes() as f64 / 1024.0,
            "Batch in progress"
        );
        let start = Instant::now();

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("API request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to read API response: {}", e)))?;
        let elapsed = start.elapsed();

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::ResponseShape {
                batch: Some(request.batch_number),
                reason: "response contained no message content".to_string(),
            })?;

        let completion = Completion {
            content,
            usage: parsed.usage,
            elapsed,
        };
        tracing::info!(
            batch = request.batch_number,
            elapsed_secs = elapsed.as_secs_f64(),
            tokens = completion.usage.total_tokens,
            tokens_per_second = completion.tokens_per_second(),
            "Batch completed"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = ApiConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..ApiConfig::default()
        };
        let client = OpenAiClient::new(&config, "gpt-4o", "key".to_string()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.name(), "gpt-4o");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "[]"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.usage, ApiUsage::new(12, 3));
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_connection_failure_is_error() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..ApiConfig::default()
        };
        let client = OpenAiClient::new(&config, "gpt-4o", "key".to_string()).unwrap();
        let request = CategorizationRequest {
            batch_number: 1,
            ids: Vec::new(),
            categories: Vec::new(),
            system_prompt: String::new(),
            prompt: String::new(),
        };
        assert!(client.categorize(&request).await.is_err());
    }
}
