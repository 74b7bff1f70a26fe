use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use orbit_config::PlannerConfig;
use orbit_core::{ApiUsage, Batch, BatchData, BatchStats, Idea, PromptBuilder, Result};
use orbit_tokens::{Model, TokenEstimator};

use crate::planner::BatchPlanner;

/// Owns the batch statistics ledger for one run
///
/// Batches are planned with [`BatchManager::plan`] and recorded with
/// [`BatchManager::record_batch_stats`]; planning never touches the ledger.
/// Completions may arrive from several tasks at once, so the ledger sits
/// behind a mutex and every update replaces a batch's entry atomically.
#[derive(Debug)]
pub struct BatchManager {
    model: Model,
    estimator: Option<Arc<TokenEstimator>>,
    planner: BatchPlanner,
    prompt: PromptBuilder,
    categories: Vec<String>,
    data: Mutex<BatchData>,
}

impl BatchManager {
    pub fn new(
        model: Model,
        estimator: Option<Arc<TokenEstimator>>,
        categories: Vec<String>,
    ) -> Self {
        Self {
            model,
            planner: BatchPlanner::new(estimator.clone()),
            estimator,
            prompt: PromptBuilder::new(),
            categories,
            data: Mutex::new(BatchData::new()),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.planner = self.planner.with_prompt(prompt.clone());
        self.prompt = prompt;
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    pub fn estimator(&self) -> Option<&Arc<TokenEstimator>> {
        self.estimator.as_ref()
    }

    /// Plan batches for `ideas` without recording anything
    pub fn plan(&self, ideas: &[Idea], config: &PlannerConfig) -> Result<Vec<Batch>> {
        self.planner.plan(ideas, &self.categories, config)
    }

    /// Token-bounded planning against the manager's vocabulary
    pub fn create_batches_by_token_limit(
        &self,
        ideas: &[Idea],
        max_tokens: usize,
    ) -> Result<Vec<Batch>> {
        self.planner
            .create_batches_by_token_limit(ideas, &self.categories, max_tokens)
    }

    /// Estimate and record statistics for planned batches.
    ///
    /// Recording a batch number that is already present replaces its entry,
    /// so calling this again for the same batches leaves totals unchanged.
    /// Returns a snapshot of the ledger afterwards.
    pub fn record_batch_stats(&self, batches: &[Batch]) -> Result<BatchData> {
        let estimated = batches
            .iter()
            .map(|batch| Ok((batch.number, self.estimate(batch)?)))
            .collect::<Result<Vec<(u32, BatchStats)>>>()?;

        let mut data = self.lock();
        for (number, stats) in estimated {
            tracing::debug!(
                batch = number,
                ideas = stats.ideas_in_batch,
                tokens = stats.token_count,
                "Recorded batch estimate"
            );
            data.insert(number, stats);
        }

        tracing::info!(
            batches = data.batches.len(),
            tokens = data.total_token_count,
            estimated_cost = data.estimated_cost,
            "Batch statistics recorded"
        );
        Ok(data.clone())
    }

    /// Reconcile a batch with the usage reported by the API.
    ///
    /// Actual usage replaces the estimate in the batch's entry and in the
    /// totals; reconciling twice with the same usage is a no-op.
    pub fn update_batch_stats(&self, batch_number: u32, usage: ApiUsage) {
        let mut data = self.lock();

        let mut stats = match data.get(batch_number) {
            Some(stats) => stats.clone(),
            None => {
                tracing::warn!(
                    batch = batch_number,
                    "Usage reported for unrecorded batch"
                );
                BatchStats::default()
            }
        };

        let total = if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.prompt_tokens + usage.completion_tokens
        };
        stats.token_count = total;
        stats.actual = Some(usage);
        stats.actual_cost = Some(
            self.model
                .pricing()
                .cost(usage.prompt_tokens, usage.completion_tokens),
        );

        tracing::debug!(
            batch = batch_number,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Reconciled batch usage"
        );
        data.insert(batch_number, stats);
    }

    /// Snapshot of the ledger
    pub fn get_batch_stats(&self) -> BatchData {
        self.lock().clone()
    }

    /// First number after every batch recorded so far
    pub fn next_batch_number(&self) -> u32 {
        self.lock().last_batch_number() + 1
    }

    fn estimate(&self, batch: &Batch) -> Result<BatchStats> {
        let ideas_in_batch = batch.len();

        let Some(estimator) = &self.estimator else {
            return Ok(BatchStats {
                text_len: batch.ideas.iter().map(Idea::title_len).sum(),
                token_count: 0,
                ideas_in_batch,
                ..Default::default()
            });
        };

        let payload = self.prompt.render_ideas(&batch.ideas)?;
        let estimate = estimator.estimate_request(&batch.ideas, &self.categories, &self.prompt)?;

        let prompt_tokens = estimate.prompt_tokens as u64;
        let completion_tokens = estimate.completion_tokens as u64;

        Ok(BatchStats {
            text_len: payload.chars().count(),
            token_count: prompt_tokens + completion_tokens,
            ideas_in_batch,
            estimated_prompt_tokens: Some(prompt_tokens),
            estimated_completion_tokens: Some(completion_tokens),
            estimated_cost: Some(estimator.calculate_batch_cost(prompt_tokens, completion_tokens)),
            actual: None,
            actual_cost: None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BatchData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_tokens::HeuristicCounter;
    use proptest::prelude::*;

    fn manager() -> BatchManager {
        let estimator =
            TokenEstimator::with_counter(Model::Gpt4o, Arc::new(HeuristicCounter::default()));
        BatchManager::new(
            Model::Gpt4o,
            Some(Arc::new(estimator)),
            vec!["Apps".to_string(), "Energy".to_string()],
        )
    }

    fn ideas(n: usize) -> Vec<Idea> {
        (0..n)
            .map(|i| Idea::new(format!("{i:02}"), format!("idea number {i}")))
            .collect()
    }

    #[test]
    fn test_planning_does_not_touch_stats() {
        let manager = manager();
        let batches = manager.plan(&ideas(5), &PlannerConfig::default()).unwrap();
        assert!(!batches.is_empty());
        assert!(manager.get_batch_stats().batches.is_empty());
        assert_eq!(manager.next_batch_number(), 1);
    }

    #[test]
    fn test_record_is_idempotent() {
        let manager = manager();
        let batches = manager.planner().create_simple_batches(&ideas(5), 2);

        let first = manager.record_batch_stats(&batches).unwrap();
        let second = manager.record_batch_stats(&batches).unwrap();

        assert_eq!(first.batches, second.batches);
        assert_eq!(first.total_token_count, second.total_token_count);
        assert_eq!(first.input_token_count, second.input_token_count);
        assert!((first.estimated_cost - second.estimated_cost).abs() < 1e-9);
        assert_eq!(first.batches.len(), 3);
        assert_eq!(first.total_ideas(), 5);
        assert_eq!(manager.next_batch_number(), 4);

        let stats = first.get(1).unwrap();
        assert_eq!(stats.ideas_in_batch, 2);
        assert_eq!(stats.estimated_completion_tokens, Some(20 + 2 * 25));
        assert_eq!(
            stats.token_count,
            stats.estimated_prompt_tokens.unwrap() + stats.estimated_completion_tokens.unwrap()
        );
        assert!(stats.estimated_cost.unwrap() > 0.0);
    }

    #[test]
    fn test_update_replaces_estimate() {
        let manager = manager();
        let batches = manager.planner().create_simple_batches(&ideas(4), 2);
        let recorded = manager.record_batch_stats(&batches).unwrap();
        let untouched = recorded.get(2).unwrap().token_count;

        let usage = ApiUsage::new(1000, 500);
        manager.update_batch_stats(1, usage);
        manager.update_batch_stats(1, usage);

        let data = manager.get_batch_stats();
        let stats = data.get(1).unwrap();
        assert_eq!(stats.token_count, 1500);
        assert_eq!(stats.actual, Some(usage));
        assert!((stats.actual_cost.unwrap() - (0.01 + 0.015)).abs() < 1e-9);

        assert_eq!(data.total_token_count, 1500 + untouched);
        assert_eq!(
            data.input_token_count,
            1000 + data.get(2).unwrap().estimated_prompt_tokens.unwrap()
        );
        assert!((data.actual_cost - 0.025).abs() < 1e-9);
        assert_eq!(data.total_token_count, data.recomputed().total_token_count);
    }

    #[test]
    fn test_update_unknown_batch() {
        let manager = manager();
        manager.update_batch_stats(9, ApiUsage::new(10, 5));

        let data = manager.get_batch_stats();
        assert_eq!(data.get(9).unwrap().token_count, 15);
        assert_eq!(data.get(9).unwrap().ideas_in_batch, 0);
        assert_eq!(manager.next_batch_number(), 10);
    }

    #[test]
    fn test_record_without_estimator() {
        let manager = BatchManager::new(Model::Gpt35Turbo, None, Vec::new());
        let batch_ideas = vec![Idea::new("a", "abc"), Idea::new("b", "de")];
        let batches = manager.planner().create_simple_batches(&batch_ideas, 10);

        let data = manager.record_batch_stats(&batches).unwrap();
        let stats = data.get(1).unwrap();
        assert_eq!(stats.text_len, 5);
        assert_eq!(stats.token_count, 0);
        assert!(stats.estimated_cost.is_none());
        assert_eq!(data.estimated_cost, 0.0);
    }

    #[test]
    fn test_concurrent_updates() {
        let manager = Arc::new(manager());
        let batches = manager.planner().create_simple_batches(&ideas(40), 1);
        manager.record_batch_stats(&batches).unwrap();

        let handles: Vec<_> = (1..=40u32)
            .map(|number| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.update_batch_stats(number, ApiUsage::new(10, 2)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let data = manager.get_batch_stats();
        assert_eq!(data.total_token_count, 40 * 12);
        assert_eq!(data.input_token_count, 400);
        assert_eq!(data.output_token_count, 80);
    }

    #[test]
    fn test_recorded_estimate_matches_planned_load() {
        let manager = manager();
        let input = ideas(12);
        let batches = manager.create_batches_by_token_limit(&input, 400).unwrap();
        assert!(batches.len() > 1);

        let data = manager.record_batch_stats(&batches).unwrap();
        for batch in &batches {
            let stats = data.get(batch.number).unwrap();
            assert_eq!(stats.token_count as usize, batch.load.value());
            assert!(stats.token_count <= 400 || batch.len() == 1);
        }
    }

    proptest! {
        #[test]
        fn prop_recorded_stats_respect_ceiling(
            titles in proptest::collection::vec("[a-zA-Z ,.]{0,60}", 1..40),
            max_tokens in 150usize..900,
        ) {
            let manager = manager();
            let input: Vec<Idea> = titles
                .iter()
                .enumerate()
                .map(|(i, title)| Idea::new(format!("{i}"), title.clone()))
                .collect();

            let batches = manager.create_batches_by_token_limit(&input, max_tokens).unwrap();
            let data = manager.record_batch_stats(&batches).unwrap();

            prop_assert_eq!(data.total_ideas(), input.len());
            for batch in &batches {
                let stats = data.get(batch.number).unwrap();
                prop_assert!(stats.token_count as usize <= max_tokens || batch.len() == 1);
                prop_assert_eq!(
                    stats.token_count,
                    stats.estimated_prompt_tokens.unwrap() + stats.estimated_completion_tokens.unwrap()
                );
            }
        }
    }
}
