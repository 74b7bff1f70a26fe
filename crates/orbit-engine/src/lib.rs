//! Categorization runs and category merging
//!
//! [`Categorizer`] plans batches, sends them through a
//! [`orbit_llm::CategorizationClient`] with bounded concurrency, and retries
//! failed, truncated or incomplete batches with smaller limits.
//! [`CategoryMerger`] folds the resulting labels back into an idea dataset.

pub mod categorizer;
pub mod merge;
pub mod metrics;

pub use categorizer::{BatchSummary, Categorizer, PlanPreview, RunReport};
pub use merge::{CategoryMap, CategoryMerger, merge_categories};
pub use metrics::{BatchMetrics, BatchStatus, MetricsSummary, RunMetrics, format_duration};
