//! Core domain models and logic for orbit
//!
//! This crate contains:
//! - Domain models (Idea, Category, Batch, BatchStats)
//! - Prompt rendering for the categorization request
//! - The greedy packing primitive shared by the batch planners
//! - JSON file helpers

pub mod batch;
pub mod category;
pub mod error;
pub mod idea;
pub mod io;
pub mod prompt;

pub use batch::{ApiUsage, Batch, BatchData, BatchLoad, BatchStats, pack_greedy, renumber};
pub use category::{Category, CategoryAssignment, CategoryTally};
pub use error::{Error, Result};
pub use idea::{Idea, IdeaId, PreparedIdeas, prepare_for_categorization};
pub use prompt::PromptBuilder;
