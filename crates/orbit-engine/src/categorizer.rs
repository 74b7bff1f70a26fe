use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use orbit_batch::{BatchManager, BatchOutcome, ResponseProcessor};
use orbit_config::{Config, PlannerConfig};
use orbit_core::{
    Batch, BatchData, BatchLoad, CategoryAssignment, Error, Idea, PromptBuilder, Result, io,
    renumber,
};
use orbit_llm::{CategorizationClient, CategorizationRequest};
use orbit_tokens::{Model, TokenEstimator};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::metrics::{BatchMetrics, BatchStatus, RunMetrics, format_duration};

/// Everything a categorization run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One assignment per categorized idea, in completion order
    pub assignments: Vec<CategoryAssignment>,
    /// Ideas still without a category after the last retry round
    pub unresolved: Vec<Idea>,
    pub stats: BatchData,
    pub metrics: RunMetrics,
    pub total_ideas: usize,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Plan of a run, without sending anything
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub model: Model,
    pub batches: Vec<BatchSummary>,
    pub stats: BatchData,
    /// Pause between requests that stays inside the model's rate limits
    pub recommended_delay_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub number: u32,
    pub ideas: usize,
    pub load: BatchLoad,
}

impl From<&Batch> for BatchSummary {
    fn from(batch: &Batch) -> Self {
        Self {
            number: batch.number,
            ideas: batch.len(),
            load: batch.load,
        }
    }
}

enum Disposition {
    Done(BatchOutcome),
    Truncated,
    Failed(Error),
}

struct ProcessedBatch {
    batch: Batch,
    metrics: BatchMetrics,
    disposition: Disposition,
}

#[derive(Default)]
struct RoundState {
    retry: Vec<Idea>,
    rate_limited: bool,
}

/// State every batch task needs, shared across spawned tasks
struct Worker {
    config: Config,
    client: Arc<dyn CategorizationClient>,
    manager: BatchManager,
    prompt: PromptBuilder,
    processor: ResponseProcessor,
}

/// Drives a categorization run: plan, dispatch, reconcile, retry
pub struct Categorizer {
    worker: Arc<Worker>,
    checkpoint: Option<PathBuf>,
}

impl Categorizer {
    /// Build with a BPE estimator for the configured model.
    ///
    /// If the tokenizer cannot be loaded the run continues without one and
    /// token planning degrades to text-length planning.
    pub fn new(config: Config, client: Arc<dyn CategorizationClient>) -> Self {
        let model = Model::resolve(&config.model);
        let estimator = match TokenEstimator::new(model) {
            Ok(estimator) => Some(Arc::new(estimator)),
            Err(e) => {
                tracing::warn!(error = %e, "Token estimator unavailable");
                None
            }
        };
        Self::with_estimator(config, client, estimator)
    }

    pub fn with_estimator(
        config: Config,
        client: Arc<dyn CategorizationClient>,
        estimator: Option<Arc<TokenEstimator>>,
    ) -> Self {
        let model = Model::resolve(&config.model);
        let manager = BatchManager::new(model, estimator, config.categories.clone());
        Self {
            worker: Arc::new(Worker {
                config,
                client,
                manager,
                prompt: PromptBuilder::new(),
                processor: ResponseProcessor::new(),
            }),
            checkpoint: None,
        }
    }

    /// Rewrite `path` with the assignments so far after every successful batch
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    pub fn manager(&self) -> &BatchManager {
        &self.worker.manager
    }

    /// Plan and estimate a run without calling the API
    pub fn preview(&self, ideas: &[Idea]) -> Result<PlanPreview> {
        let batches = self.worker.manager.plan(ideas, &self.worker.config.planner)?;
        let stats = self.worker.manager.record_batch_stats(&batches)?;

        let recommended_delay_secs = match self.worker.manager.estimator() {
            Some(estimator) => {
                let sizes: Vec<usize> = stats
                    .batches
                    .values()
                    .map(|batch| batch.token_count as usize)
                    .collect();
                estimator.calculate_rate_limit_delay(&sizes).as_secs_f64()
            }
            None => 0.0,
        };

        Ok(PlanPreview {
            model: self.worker.manager.model(),
            batches: batches.iter().map(BatchSummary::from).collect(),
            stats,
            recommended_delay_secs,
        })
    }

    pub async fn run(&self, ideas: Vec<Idea>) -> Result<RunReport> {
        let started = Instant::now();
        let total_ideas = ideas.len();
        let mut assignments: Vec<CategoryAssignment> = Vec::new();
        let mut metrics = RunMetrics::default();

        tracing::info!(
            model = %self.worker.manager.model(),
            client = self.worker.client.name(),
            ideas = total_ideas,
            workers = self.worker.config.run.max_workers,
            sequential = self.worker.config.run.sequential,
            "Starting categorization"
        );

        let mut pending = ideas;
        let mut limits = self.worker.config.planner.clone();
        let mut round = 0u32;

        while !pending.is_empty() {
            let round_started = Instant::now();

            let mut batches = self.worker.manager.plan(&pending, &limits)?;
            renumber(&mut batches, self.worker.manager.next_batch_number());
            self.worker.manager.record_batch_stats(&batches)?;

            let state = self
                .dispatch(batches, round, &mut assignments, &mut metrics)
                .await?;

            if round == 0 {
                metrics.phases.processing += round_started.elapsed();
            } else {
                metrics.phases.retries += round_started.elapsed();
            }
            pending = state.retry;

            if pending.is_empty() {
                break;
            }
            if round >= self.worker.config.run.max_retries {
                tracing::warn!(
                    unresolved = pending.len(),
                    rounds = round,
                    "Giving up on ideas after retry limit"
                );
                break;
            }

            round += 1;
            limits = halved(&limits);
            tracing::info!(
                round,
                ideas = pending.len(),
                "Retrying with reduced batch size"
            );

            if state.rate_limited {
                let cooldown = Duration::from_secs(self.worker.config.run.rate_limit_cooldown_secs);
                tracing::warn!(secs = cooldown.as_secs(), "Rate limited, cooling down");
                tokio::time::sleep(cooldown).await;
            }
        }

        metrics.total = started.elapsed();
        let stats = self.worker.manager.get_batch_stats();

        tracing::info!(
            processed = assignments.len(),
            total = total_ideas,
            input_tokens = stats.input_token_count,
            output_tokens = stats.output_token_count,
            total_tokens = stats.total_token_count,
            cost = stats.actual_cost,
            runtime = %format_duration(metrics.total),
            "Categorization complete"
        );

        Ok(RunReport {
            assignments,
            unresolved: pending,
            stats,
            metrics,
            total_ideas,
        })
    }

    async fn dispatch(
        &self,
        batches: Vec<Batch>,
        round: u32,
        assignments: &mut Vec<CategoryAssignment>,
        metrics: &mut RunMetrics,
    ) -> Result<RoundState> {
        let mut state = RoundState::default();
        let run = &self.worker.config.run;

        if run.sequential {
            let pause = Duration::from_millis(run.request_pause_ms);
            let count = batches.len();
            for (index, batch) in batches.into_iter().enumerate() {
                tracing::info!(batch = batch.number, "Processing batch");
                let processed = self.worker.process_batch(batch, round).await;
                self.absorb(processed, &mut state, assignments, metrics);
                if index + 1 < count && !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            return Ok(state);
        }

        let workers = run.max_workers.max(1).min(batches.len().max(1));
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<ProcessedBatch> = JoinSet::new();
        // Ideas of batches whose task has not reported back yet
        let mut in_flight: BTreeMap<u32, Vec<Idea>> = BTreeMap::new();

        for batch in batches {
            while let Some(joined) = tasks.try_join_next() {
                self.collect(joined, &mut in_flight, &mut state, assignments, metrics);
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Other(anyhow::anyhow!("batch worker pool closed")))?;
            let worker = Arc::clone(&self.worker);
            in_flight.insert(batch.number, batch.ideas.clone());

            tracing::info!(batch = batch.number, "Processing batch");
            tasks.spawn(async move {
                let _permit = permit;
                worker.process_batch(batch, round).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, &mut in_flight, &mut state, assignments, metrics);
        }

        for (number, ideas) in in_flight {
            tracing::error!(batch = number, "Batch task did not complete, retrying its ideas");
            state.retry.extend(ideas);
        }

        Ok(state)
    }

    fn collect(
        &self,
        joined: std::result::Result<ProcessedBatch, tokio::task::JoinError>,
        in_flight: &mut BTreeMap<u32, Vec<Idea>>,
        state: &mut RoundState,
        assignments: &mut Vec<CategoryAssignment>,
        metrics: &mut RunMetrics,
    ) {
        match joined {
            Ok(processed) => {
                in_flight.remove(&processed.batch.number);
                self.absorb(processed, state, assignments, metrics);
            }
            Err(e) => tracing::error!(error = %e, "Batch task failed"),
        }
    }

    fn absorb(
        &self,
        processed: ProcessedBatch,
        state: &mut RoundState,
        assignments: &mut Vec<CategoryAssignment>,
        metrics: &mut RunMetrics,
    ) {
        let ProcessedBatch {
            batch,
            metrics: batch_metrics,
            disposition,
        } = processed;
        metrics.record(batch_metrics);

        match disposition {
            Disposition::Done(outcome) => {
                tracing::info!(
                    batch = batch.number,
                    assigned = outcome.assigned.len(),
                    missing = outcome.missing.len(),
                    "Batch completed"
                );
                assignments.extend(outcome.assigned);
                state.retry.extend(outcome.missing);

                if let Some(path) = &self.checkpoint {
                    let save_started = Instant::now();
                    save_checkpoint(path, assignments);
                    metrics.phases.saving += save_started.elapsed();
                }
            }
            Disposition::Truncated => {
                tracing::info!(batch = batch.number, "Adding batch to retry list");
                state.retry.extend(batch.ideas);
            }
            Disposition::Failed(e) => {
                if e.is_rate_limit() {
                    state.rate_limited = true;
                }
                tracing::info!(batch = batch.number, "Adding batch to retry list");
                state.retry.extend(batch.ideas);
            }
        }
    }
}

impl Worker {
    async fn process_batch(&self, batch: Batch, round: u32) -> ProcessedBatch {
        let started = Instant::now();
        let mut metrics = BatchMetrics::new(batch.number, round, batch.len());

        let disposition = match self.request_for(&batch) {
            Ok(request) => {
                metrics.payload_bytes = request.payload_bytes();
                self.call(&batch, &request, &mut metrics).await
            }
            Err(e) => Disposition::Failed(e),
        };

        metrics.total_secs = started.elapsed().as_secs_f64();
        match &disposition {
            Disposition::Done(outcome) => {
                metrics.status = BatchStatus::Success;
                metrics.processed_ideas = outcome.assigned.len();
            }
            Disposition::Truncated => metrics.status = BatchStatus::FlaggedForRetry,
            Disposition::Failed(e) => {
                tracing::error!(batch = batch.number, error = %e, "Error processing batch");
                metrics.status = BatchStatus::Error;
                metrics.error = Some(e.to_string());
            }
        }

        ProcessedBatch {
            batch,
            metrics,
            disposition,
        }
    }

    async fn call(
        &self,
        batch: &Batch,
        request: &CategorizationRequest,
        metrics: &mut BatchMetrics,
    ) -> Disposition {
        let completion = match self.client.categorize(request).await {
            Ok(completion) => completion,
            Err(e) => return Disposition::Failed(e),
        };
        metrics.api_secs = Some(completion.elapsed.as_secs_f64());
        metrics.usage = Some(completion.usage);
        metrics.tokens_per_second = Some(completion.tokens_per_second());

        let completion_tokens = completion.usage.completion_tokens;
        if completion_tokens >= self.config.run.truncation_threshold {
            tracing::warn!(
                batch = batch.number,
                completion_tokens,
                "Large completion size, flagging for retry"
            );
            return Disposition::Truncated;
        }

        let parse_started = Instant::now();
        let parsed = self
            .processor
            .parse_assignments(&completion.content, Some(batch.number));
        metrics.processing_secs = Some(parse_started.elapsed().as_secs_f64());

        match parsed {
            Ok(parsed) => {
                self.manager.update_batch_stats(batch.number, completion.usage);
                Disposition::Done(self.processor.reconcile(batch, parsed))
            }
            Err(e) => Disposition::Failed(e),
        }
    }

    fn request_for(&self, batch: &Batch) -> Result<CategorizationRequest> {
        Ok(CategorizationRequest {
            batch_number: batch.number,
            ids: batch.ids().cloned().collect(),
            categories: self.config.categories.clone(),
            system_prompt: self.prompt.system_prompt().to_string(),
            prompt: self
                .prompt
                .categorization_prompt(&self.config.categories, &batch.ideas)?,
        })
    }
}

/// Limits for a retry round: every ceiling halved, never below one
fn halved(limits: &PlannerConfig) -> PlannerConfig {
    PlannerConfig {
        strategy: limits.strategy,
        max_tokens: (limits.max_tokens / 2).max(1),
        max_chars: (limits.max_chars / 2).max(1),
        ideas_per_batch: (limits.ideas_per_batch / 2).max(1),
    }
}

fn save_checkpoint(path: &Path, assignments: &[CategoryAssignment]) {
    match io::save_json(assignments, path) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            assignments = assignments.len(),
            "Saved checkpoint"
        ),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save checkpoint"),
    }
}
