//! Token estimation and cost accounting
//!
//! Counts are heuristic: they are used to size batches before a request is
//! made and are superseded by the usage the API reports afterwards.

pub mod estimator;
pub mod pricing;

use std::sync::Arc;

use orbit_core::{Error, Result};
use tiktoken_rs::CoreBPE;

pub use estimator::{RESPONSE_BASE_TOKENS, RequestEstimate, TOKENS_PER_LABEL, TokenEstimator};
pub use pricing::{Model, ModelPricing, RateLimits};

/// Something that can turn text into a token count
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Count tokens for multiple strings
    fn count_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|text| self.count(text)).collect()
    }
}

/// BPE token counter backed by tiktoken
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// cl100k_base encoding (GPT-4, GPT-3.5-turbo)
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Encoding for `model`, falling back to cl100k_base for unknown names
    pub fn for_model(model: &str) -> Result<Self> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self { bpe: Arc::new(bpe) }),
            Err(_) => Self::cl100k(),
        }
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Character-based approximation: one token per `chars_per_token` characters
#[derive(Debug, Clone, Copy)]
pub struct HeuristicCounter {
    chars_per_token: usize,
}

impl HeuristicCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}
