//! Client trait

use std::time::Duration;

use async_trait::async_trait;
use orbit_core::{ApiUsage, IdeaId, Result};

/// One categorization request, fully rendered
#[derive(Debug, Clone)]
pub struct CategorizationRequest {
    pub batch_number: u32,
    /// IDs of the ideas embedded in `prompt`, in order
    pub ids: Vec<IdeaId>,
    /// Vocabulary embedded in `prompt`
    pub categories: Vec<String>,
    pub system_prompt: String,
    pub prompt: String,
}

impl CategorizationRequest {
    /// Size of the user prompt in bytes
    pub fn payload_bytes(&self) -> usize {
        self.prompt.len()
    }
}

/// Raw model output and the usage the API reported for it
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: ApiUsage,
    pub elapsed: Duration,
}

impl Completion {
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.usage.total_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// Trait for anything that can answer a categorization request
#[async_trait]
pub trait CategorizationClient: Send + Sync {
    /// Send the request and return the model's raw answer
    async fn categorize(&self, request: &CategorizationRequest) -> Result<Completion>;

    /// Short name for logs and reports
    fn name(&self) -> &str;
}
