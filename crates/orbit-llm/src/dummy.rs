use std::time::{Duration, Instant};

use async_trait::async_trait;
use orbit_core::{ApiUsage, CategoryAssignment, Category, Result, category::UNCATEGORIZED};

use crate::client::{CategorizationClient, CategorizationRequest, Completion};

/// Answers requests locally without network access.
///
/// Each idea gets a category picked deterministically from its ID, so runs
/// are reproducible. Usage is approximated at four characters per token and
/// split evenly between prompt and completion.
#[derive(Debug, Clone, Default)]
pub struct DummyClient {
    latency: Duration,
}

impl DummyClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated response time per request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn pick<'a>(id: &str, categories: &'a [String]) -> &'a str {
        if categories.is_empty() {
            return UNCATEGORIZED;
        }
        let sum: usize = id.bytes().map(usize::from).sum();
        &categories[sum % categories.len()]
    }
}

#[async_trait]
impl CategorizationClient for DummyClient {
    async fn categorize(&self, request: &CategorizationRequest) -> Result<Completion> {
        let start = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let assignments: Vec<CategoryAssignment> = request
            .ids
            .iter()
            .map(|id| CategoryAssignment {
                id: id.clone(),
                category: Category::parse(Self::pick(id.as_str(), &request.categories)),
            })
            .collect();
        let content = serde_json::to_string(&assignments)?;

        let tokens = (content.len() / 4) as u64;
        let usage = ApiUsage::new(tokens / 2, tokens / 2);

        tracing::debug!(
            batch = request.batch_number,
            ideas = request.ids.len(),
            tokens = usage.total_tokens,
            "Dummy categorization"
        );

        Ok(Completion {
            content,
            usage,
            elapsed: start.elapsed(),
        })
    }

    fn name(&self) -> &str {
        "dummy"
    }
}
