//! Batch domain model and the batch statistics ledger

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::idea::{Idea, IdeaId};

/// What a batch's load is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum BatchLoad {
    /// Estimated prompt + completion tokens
    Tokens(usize),
    /// Characters of idea titles
    Chars(usize),
    /// Number of ideas
    Ideas(usize),
}

impl BatchLoad {
    pub fn value(&self) -> usize {
        match self {
            BatchLoad::Tokens(n) | BatchLoad::Chars(n) | BatchLoad::Ideas(n) => *n,
        }
    }
}

/// An ordered, non-empty group of ideas submitted in one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based
    pub number: u32,
    pub ideas: Vec<Idea>,
    pub load: BatchLoad,
}

impl Batch {
    /// Number groups from 1, measuring each group's load with `unit`
    pub fn from_groups(
        groups: Vec<(Vec<Idea>, usize)>,
        unit: impl Fn(usize) -> BatchLoad,
    ) -> Vec<Batch> {
        groups
            .into_iter()
            .zip(1u32..)
            .map(|((ideas, load), number)| Batch {
                number,
                ideas,
                load: unit(load),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &IdeaId> {
        self.ideas.iter().map(|idea| &idea.id)
    }
}

/// Renumber batches consecutively starting at `start`
pub fn renumber(batches: &mut [Batch], start: u32) {
    for (batch, number) in batches.iter_mut().zip(start..) {
        batch.number = number;
    }
}

/// Greedy bin-packing in input order.
///
/// Every group starts at `fixed` and grows by `cost(item)`. An item that would
/// push a non-empty group past `limit` closes it and starts the next one. An
/// item that exceeds `limit` on its own still gets a group to itself, so no
/// item is ever dropped.
pub fn pack_greedy<T: Clone>(
    items: &[T],
    limit: usize,
    fixed: usize,
    cost: impl Fn(&T) -> usize,
) -> Vec<(Vec<T>, usize)> {
    let mut groups = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut load = fixed;

    for item in items {
        let item_cost = cost(item);

        if !current.is_empty() && load + item_cost > limit {
            groups.push((std::mem::take(&mut current), load));
            load = fixed;
        }

        current.push(item.clone());
        load += item_cost;
    }

    if !current.is_empty() {
        groups.push((current, load));
    }

    groups
}

/// Token usage reported by the API for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl ApiUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Statistics for one batch
///
/// Created from estimates when the batch is recorded. Once the API reports
/// real usage, `actual` is set and `token_count` is overwritten with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub text_len: usize,
    pub token_count: u64,
    pub ideas_in_batch: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<ApiUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
}

impl BatchStats {
    /// Best known prompt tokens: actual if reconciled, else the estimate
    pub fn input_tokens(&self) -> u64 {
        self.actual
            .map(|usage| usage.prompt_tokens)
            .or(self.estimated_prompt_tokens)
            .unwrap_or(0)
    }

    /// Best known completion tokens: actual if reconciled, else the estimate
    pub fn output_tokens(&self) -> u64 {
        self.actual
            .map(|usage| usage.completion_tokens)
            .or(self.estimated_completion_tokens)
            .unwrap_or(0)
    }

    pub fn is_reconciled(&self) -> bool {
        self.actual.is_some()
    }
}

/// Per-batch statistics plus running totals over all batches of a run
///
/// Totals always equal the sum of each batch's best known figures. Replacing
/// a batch's entry backs out its previous token counts first, so recording
/// or reconciling the same batch twice never double counts. Cost totals are
/// re-summed from the entries on every insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchData {
    pub batches: BTreeMap<u32, BatchStats>,
    pub total_token_count: u64,
    pub total_text_count: u64,
    pub input_token_count: u64,
    pub output_token_count: u64,
    /// Sum of plan-time cost estimates
    pub estimated_cost: f64,
    /// Sum of costs computed from reported usage
    pub actual_cost: f64,
}

impl BatchData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `number`, adjusting totals
    pub fn insert(&mut self, number: u32, stats: BatchStats) -> Option<BatchStats> {
        self.add_contribution(&stats);
        let previous = self.batches.insert(number, stats);
        if let Some(previous) = &previous {
            self.remove_contribution(previous);
        }
        self.sum_costs();
        previous
    }

    pub fn get(&self, number: u32) -> Option<&BatchStats> {
        self.batches.get(&number)
    }

    pub fn last_batch_number(&self) -> u32 {
        self.batches.keys().next_back().copied().unwrap_or(0)
    }

    pub fn total_ideas(&self) -> usize {
        self.batches.values().map(|stats| stats.ideas_in_batch).sum()
    }

    /// Rebuild totals from the per-batch entries
    pub fn recomputed(&self) -> BatchData {
        let mut data = BatchData::new();
        for (number, stats) in &self.batches {
            data.insert(*number, stats.clone());
        }
        data
    }

    fn add_contribution(&mut self, stats: &BatchStats) {
        self.total_token_count += stats.token_count;
        self.total_text_count += stats.text_len as u64;
        self.input_token_count += stats.input_tokens();
        self.output_token_count += stats.output_tokens();
    }

    fn remove_contribution(&mut self, stats: &BatchStats) {
        self.total_token_count = self.total_token_count.saturating_sub(stats.token_count);
        self.total_text_count = self.total_text_count.saturating_sub(stats.text_len as u64);
        self.input_token_count = self.input_token_count.saturating_sub(stats.input_tokens());
        self.output_token_count = self
            .output_token_count
            .saturating_sub(stats.output_tokens());
    }

    // Float totals are summed afresh so repeated replacement cannot drift
    fn sum_costs(&mut self) {
        self.estimated_cost = self
            .batches
            .values()
            .filter_map(|stats| stats.estimated_cost)
            .sum();
        self.actual_cost = self
            .batches
            .values()
            .filter_map(|stats| stats.actual_cost)
            .sum();
    }
}
