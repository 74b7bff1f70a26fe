use std::sync::Arc;

use orbit_config::{PlanStrategy, PlannerConfig};
use orbit_core::{Batch, BatchLoad, Idea, PromptBuilder, Result, pack_greedy};
use orbit_tokens::TokenEstimator;

/// Character ceiling used when token packing is requested without an estimator
pub const DEGRADED_MAX_CHARS: usize = 4000;

/// Partitions ideas into ordered, numbered batches
///
/// Every strategy keeps input order and never drops an idea: concatenating
/// the returned batches yields the input list.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    estimator: Option<Arc<TokenEstimator>>,
    prompt: PromptBuilder,
}

impl BatchPlanner {
    pub fn new(estimator: Option<Arc<TokenEstimator>>) -> Self {
        Self {
            estimator,
            prompt: PromptBuilder::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn has_estimator(&self) -> bool {
        self.estimator.is_some()
    }

    /// Dispatch on the configured strategy
    pub fn plan(
        &self,
        ideas: &[Idea],
        categories: &[String],
        config: &PlannerConfig,
    ) -> Result<Vec<Batch>> {
        let batches = match config.strategy {
            PlanStrategy::Token => {
                self.create_batches_by_token_limit(ideas, categories, config.max_tokens)?
            }
            PlanStrategy::Text => self.create_batches_by_text_limit(ideas, config.max_chars),
            PlanStrategy::Count => self.create_simple_batches(ideas, config.ideas_per_batch),
        };

        tracing::info!(
            strategy = ?config.strategy,
            ideas = ideas.len(),
            batches = batches.len(),
            "Planned batches"
        );
        Ok(batches)
    }

    /// Greedy packing under a token ceiling covering prompt and completion.
    ///
    /// Without an estimator this degrades to title-length packing at
    /// [`DEGRADED_MAX_CHARS`].
    pub fn create_batches_by_token_limit(
        &self,
        ideas: &[Idea],
        categories: &[String],
        max_tokens: usize,
    ) -> Result<Vec<Batch>> {
        match &self.estimator {
            Some(estimator) => {
                estimator.optimize_batch_size(ideas, categories, max_tokens, &self.prompt)
            }
            None => {
                tracing::warn!(
                    max_chars = DEGRADED_MAX_CHARS,
                    "No token estimator available, falling back to text-length batching"
                );
                Ok(self.create_batches_by_text_limit(ideas, DEGRADED_MAX_CHARS))
            }
        }
    }

    /// Greedy packing by title characters; `current + next > max_chars`
    /// closes the batch
    pub fn create_batches_by_text_limit(&self, ideas: &[Idea], max_chars: usize) -> Vec<Batch> {
        let groups = pack_greedy(ideas, max_chars, 0, Idea::title_len);
        Batch::from_groups(groups, BatchLoad::Chars)
    }

    /// Batches of `ideas_per_batch` ideas, the last one possibly smaller
    pub fn create_simple_batches(&self, ideas: &[Idea], ideas_per_batch: usize) -> Vec<Batch> {
        let size = ideas_per_batch.max(1);
        let groups = ideas
            .chunks(size)
            .map(|chunk| (chunk.to_vec(), chunk.len()))
            .collect();
        Batch::from_groups(groups, BatchLoad::Ideas)
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(None)
    }
}
