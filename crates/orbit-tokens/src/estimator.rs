use std::sync::Arc;
use std::time::Duration;

use orbit_core::prompt::{IDEA_SEPARATOR, IDEAS_CLOSE, IDEAS_OPEN};
use orbit_core::{Batch, BatchLoad, Idea, PromptBuilder, Result, pack_greedy};

use crate::pricing::{Model, RateLimits};
use crate::{TiktokenCounter, TokenCounter};

/// Completion tokens spent on the response array itself
pub const RESPONSE_BASE_TOKENS: usize = 20;

/// Completion tokens per `{_id, category}` entry in the response
pub const TOKENS_PER_LABEL: usize = 25;

/// Chat framing overhead per message and for the reply priming
const TOKENS_PER_MESSAGE: usize = 3;
const TOKENS_PER_FIELD: usize = 1;
const REPLY_PRIMING_TOKENS: usize = 3;

/// Estimated size of one categorization request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestEstimate {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl RequestEstimate {
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Estimates request sizes and prices them for one model
#[derive(Clone)]
pub struct TokenEstimator {
    model: Model,
    counter: Arc<dyn TokenCounter>,
}

impl TokenEstimator {
    /// Estimator using the model's BPE encoding
    pub fn new(model: Model) -> Result<Self> {
        let counter = TiktokenCounter::for_model(model.as_str())?;
        Ok(Self::with_counter(model, Arc::new(counter)))
    }

    pub fn with_counter(model: Model, counter: Arc<dyn TokenCounter>) -> Self {
        Self { model, counter }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn rate_limits(&self) -> RateLimits {
        self.model.rate_limits()
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Tokens for a chat exchange given as `(role, content)` pairs
    pub fn count_message_tokens(&self, messages: &[(&str, &str)]) -> usize {
        let framed: usize = messages
            .iter()
            .map(|(role, content)| {
                TOKENS_PER_MESSAGE
                    + self.counter.count(role)
                    + TOKENS_PER_FIELD
                    + self.counter.count(content)
                    + TOKENS_PER_FIELD
            })
            .sum();
        framed + REPLY_PRIMING_TOKENS
    }

    pub fn estimate_categorization_prompt_tokens(&self, prompt: &str) -> usize {
        self.counter.count(prompt)
    }

    /// Prompt tokens of a request before any idea is added: both chat
    /// messages with their framing, plus the brackets of the idea array
    pub fn estimate_prompt_overhead(
        &self,
        categories: &[String],
        prompt: &PromptBuilder,
    ) -> Result<usize> {
        let header = prompt.header(categories)?;
        let messages = self.count_message_tokens(&[
            ("system", prompt.system_prompt()),
            ("user", &header),
        ]);
        Ok(messages
            + self.estimate_categorization_prompt_tokens(IDEAS_OPEN)
            + self.estimate_categorization_prompt_tokens(IDEAS_CLOSE))
    }

    /// Prompt tokens one idea adds: its JSON object and a separator
    pub fn estimate_idea_prompt_tokens(&self, idea: &Idea, prompt: &PromptBuilder) -> Result<usize> {
        let rendered = prompt.render_idea(idea)?;
        Ok(self.estimate_categorization_prompt_tokens(&rendered)
            + self.estimate_categorization_prompt_tokens(IDEA_SEPARATOR))
    }

    /// Estimate for sending `ideas` in one request.
    ///
    /// The same figure [`optimize_batch_size`](Self::optimize_batch_size)
    /// packs against, so a planned batch's load and its estimate agree.
    pub fn estimate_request(
        &self,
        ideas: &[Idea],
        categories: &[String],
        prompt: &PromptBuilder,
    ) -> Result<RequestEstimate> {
        let mut prompt_tokens = self.estimate_prompt_overhead(categories, prompt)?;
        for idea in ideas {
            prompt_tokens += self.estimate_idea_prompt_tokens(idea, prompt)?;
        }
        Ok(RequestEstimate {
            prompt_tokens,
            completion_tokens: self.estimate_idea_response_tokens(ideas.len()),
        })
    }

    /// `RESPONSE_BASE_TOKENS + idea_count * TOKENS_PER_LABEL`
    pub fn estimate_idea_response_tokens(&self, idea_count: usize) -> usize {
        RESPONSE_BASE_TOKENS + idea_count * TOKENS_PER_LABEL
    }

    /// Dollar cost of a request at the model's list prices
    pub fn calculate_batch_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        self.model.pricing().cost(prompt_tokens, completion_tokens)
    }

    /// Pause between requests that keeps a run inside the model's limits.
    ///
    /// The larger of the token-based delay (average batch size against the
    /// tokens-per-minute limit) and the request-based delay.
    pub fn calculate_rate_limit_delay(&self, batch_token_sizes: &[usize]) -> Duration {
        let limits = self.rate_limits();
        if batch_token_sizes.is_empty() || limits.tpm == 0 || limits.rpm == 0 {
            return Duration::ZERO;
        }

        let average = batch_token_sizes.iter().sum::<usize>() as f64 / batch_token_sizes.len() as f64;
        let token_delay = average / f64::from(limits.tpm) * 60.0;
        let request_delay = 60.0 / f64::from(limits.rpm);

        Duration::from_secs_f64(token_delay.max(request_delay))
    }

    /// Token-bounded greedy packing.
    ///
    /// A batch's load is its [`estimate_request`](Self::estimate_request)
    /// total: the prompt overhead and response base, plus for every idea its
    /// prompt tokens and its expected response entry. Loads are computed once
    /// per idea up front.
    pub fn optimize_batch_size(
        &self,
        ideas: &[Idea],
        categories: &[String],
        max_tokens: usize,
        prompt: &PromptBuilder,
    ) -> Result<Vec<Batch>> {
        let fixed = self.estimate_prompt_overhead(categories, prompt)? + RESPONSE_BASE_TOKENS;

        let costed = ideas
            .iter()
            .map(|idea| {
                let cost = self.estimate_idea_prompt_tokens(idea, prompt)? + TOKENS_PER_LABEL;
                Ok((idea.clone(), cost))
            })
            .collect::<Result<Vec<(Idea, usize)>>>()?;

        let groups = pack_greedy(&costed, max_tokens, fixed, |(_, cost)| *cost)
            .into_iter()
            .map(|(members, load)| {
                let ideas = members.into_iter().map(|(idea, _)| idea).collect();
                (ideas, load)
            })
            .collect();

        let batches = Batch::from_groups(groups, BatchLoad::Tokens);
        tracing::debug!(
            ideas = ideas.len(),
            batches = batches.len(),
            max_tokens,
            "Packed ideas by token limit"
        );
        Ok(batches)
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeuristicCounter;
    use proptest::prelude::*;

    fn estimator(model: Model) -> TokenEstimator {
        TokenEstimator::with_counter(model, Arc::new(HeuristicCounter::default()))
    }

    fn ideas(titles: &[String]) -> Vec<Idea> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| Idea::new(format!("id{i:03}"), title.clone()))
            .collect()
    }

    #[test]
    fn test_response_tokens_linear() {
        let est = estimator(Model::Gpt4o);
        assert_eq!(est.estimate_idea_response_tokens(0), 20);
        assert_eq!(est.estimate_idea_response_tokens(4), 120);
    }

    #[test]
    fn test_batch_cost() {
        let est = estimator(Model::Gpt4);
        let cost = est.calculate_batch_cost(1000, 500);
        assert!((cost - (0.03 + 0.03)).abs() < 1e-9);

        let cheap = estimator(Model::Gpt35Turbo).calculate_batch_cost(2000, 1000);
        assert!((cheap - (0.003 + 0.002)).abs() < 1e-9);
    }

    #[test]
    fn test_message_tokens() {
        let est = estimator(Model::Gpt4o);
        // "user" = 1, "abcdefgh" = 2
        let count = est.count_message_tokens(&[("user", "abcdefgh")]);
        assert_eq!(count, 3 + 1 + 1 + 2 + 1 + 3);
        assert_eq!(est.count_message_tokens(&[]), 3);
    }

    #[test]
    fn test_rate_limit_delay() {
        let est = estimator(Model::Gpt4);
        // 10k tpm: 5000-token batches need 30s, above the 0.12s request delay
        let delay = est.calculate_rate_limit_delay(&[5000, 5000]);
        assert_eq!(delay, Duration::from_secs(30));

        let small = est.calculate_rate_limit_delay(&[1]);
        assert!((small.as_secs_f64() - 0.12).abs() < 1e-6);

        assert_eq!(est.calculate_rate_limit_delay(&[]), Duration::ZERO);
    }

    #[test]
    fn test_single_oversized_idea_gets_own_batch() {
        let est = estimator(Model::Gpt4o);
        let input = ideas(&["x".repeat(50)]);

        let batches = est
            .optimize_batch_size(&input, &[], 10, &PromptBuilder::new())
            .unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].ideas, input);
        assert_eq!(batches[0].number, 1);
    }

    #[test]
    fn test_batches_split_under_ceiling() {
        let est = estimator(Model::Gpt4o);
        let builder = PromptBuilder::new();
        let categories = vec!["Apps".to_string()];
        let input = ideas(&vec!["a fairly ordinary idea title".to_string(); 20]);

        let overhead = est.estimate_prompt_overhead(&categories, &builder).unwrap();
        let per_idea = est.estimate_idea_prompt_tokens(&input[0], &builder).unwrap() + TOKENS_PER_LABEL;
        let max_tokens = overhead + RESPONSE_BASE_TOKENS + per_idea * 5;

        let batches = est
            .optimize_batch_size(&input, &categories, max_tokens, &builder)
            .unwrap();

        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 5));
        assert!(batches.iter().all(|b| b.load.value() <= max_tokens));
    }

    #[test]
    fn test_overhead_counts_both_messages() {
        let est = estimator(Model::Gpt4o);
        let builder = PromptBuilder::new().with_system_prompt("x".repeat(400));
        let categories = vec!["Apps".to_string()];

        let header = builder.header(&categories).unwrap();
        let overhead = est.estimate_prompt_overhead(&categories, &builder).unwrap();

        // 100 tokens of system prompt on top of the user message
        assert!(overhead >= est.count_tokens(&header) + 100);
        assert_eq!(
            overhead,
            est.count_message_tokens(&[("system", builder.system_prompt()), ("user", &header)])
                + est.count_tokens(IDEAS_OPEN)
                + est.count_tokens(IDEAS_CLOSE)
        );
    }

    #[test]
    fn test_request_estimate_matches_planned_load() {
        let est = estimator(Model::Gpt4o);
        let builder = PromptBuilder::new();
        let categories = vec!["Apps".to_string(), "Energy".to_string()];
        let input = ideas(&[
            "short".to_string(),
            "a much longer idea title about solar kiosks".to_string(),
            "tutor marketplace".to_string(),
        ]);

        let batches = est
            .optimize_batch_size(&input, &categories, 10_000, &builder)
            .unwrap();
        assert_eq!(batches.len(), 1);

        let estimate = est.estimate_request(&input, &categories, &builder).unwrap();
        assert_eq!(estimate.total(), batches[0].load.value());
        assert_eq!(estimate.completion_tokens, 20 + 3 * 25);
    }

    proptest! {
        #[test]
        fn prop_token_packing_covers_and_respects_ceiling(
            titles in proptest::collection::vec("[a-z ]{0,80}", 0..40),
            max_tokens in 1usize..600,
        ) {
            let est = estimator(Model::Gpt35Turbo);
            let input = ideas(&titles);
            let batches = est
                .optimize_batch_size(&input, &[], max_tokens, &PromptBuilder::new())
                .unwrap();

            let flattened: Vec<Idea> = batches.iter().flat_map(|b| b.ideas.clone()).collect();
            prop_assert_eq!(flattened, input);

            for (index, batch) in batches.iter().enumerate() {
                prop_assert!(!batch.is_empty());
                prop_assert_eq!(batch.number as usize, index + 1);
                prop_assert!(batch.load.value() <= max_tokens || batch.len() == 1);

                let estimate = est
                    .estimate_request(&batch.ideas, &[], &PromptBuilder::new())
                    .unwrap();
                prop_assert_eq!(estimate.total(), batch.load.value());
            }
        }
    }
}
