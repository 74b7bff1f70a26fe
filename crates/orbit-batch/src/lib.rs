//! Batch planning, statistics and response handling
//!
//! Planning is pure: [`BatchPlanner`] only groups ideas. Statistics are
//! recorded in a separate, explicit step on [`BatchManager`], which owns the
//! ledger for the duration of a run.

pub mod manager;
pub mod planner;
pub mod response;

pub use manager::BatchManager;
pub use planner::{BatchPlanner, DEGRADED_MAX_CHARS};
pub use response::{BatchOutcome, ResponseProcessor};
