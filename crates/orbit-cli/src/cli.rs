use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use orbit_config::{Config, PlanStrategy};

#[derive(Parser)]
#[command(name = "orbit")]
#[command(about = "Batch categorization of startup ideas with language models", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Categorize ideas through the language-model API
    Categorize {
        /// JSON array of `{_id, title}` ideas
        input: PathBuf,

        /// Where results, stats and metrics are written
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Do not write preliminary results after each batch
        #[arg(long)]
        no_checkpoint: bool,

        #[command(flatten)]
        planner: PlannerArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show how ideas would be batched and what it would cost
    Plan {
        /// JSON array of `{_id, title}` ideas
        input: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        planner: PlannerArgs,
    },

    /// Merge a categorized-ideas file into an idea dataset
    Merge {
        /// Canonical ideas
        ideas: PathBuf,

        /// JSON array of `{_id, category}` pairs
        categorized: PathBuf,

        /// Output file (default: timestamped file in the output dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Fold descriptions into titles and drop empty ideas
    Prepare {
        /// Raw exported ideas
        input: PathBuf,

        /// Output file (default: timestamped file in the data dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Count categories in a categorized or merged file
    Tally {
        input: PathBuf,

        /// Print the tally as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Estimated tokens
    Token,
    /// Title characters
    Text,
    /// Ideas per batch
    Count,
}

impl From<StrategyArg> for PlanStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Token => PlanStrategy::Token,
            StrategyArg::Text => PlanStrategy::Text,
            StrategyArg::Count => PlanStrategy::Count,
        }
    }
}

/// Overrides for the `[planner]` section and the model
#[derive(Args, Default)]
pub struct PlannerArgs {
    /// Model name, e.g. gpt-4o
    #[arg(long, short)]
    pub model: Option<String>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Token ceiling per batch (token strategy)
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Character ceiling per batch (text strategy)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Ideas per batch (count strategy)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl PlannerArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(strategy) = self.strategy {
            config.planner.strategy = strategy.into();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.planner.max_tokens = max_tokens;
        }
        if let Some(max_chars) = self.max_chars {
            config.planner.max_chars = max_chars;
        }
        if let Some(batch_size) = self.batch_size {
            config.planner.ideas_per_batch = batch_size;
        }
    }
}

/// Overrides for the `[run]` section
#[derive(Args, Default)]
pub struct RunArgs {
    /// Concurrent requests
    #[arg(long, short)]
    pub workers: Option<usize>,

    /// One request at a time with a pause in between
    #[arg(long)]
    pub sequential: bool,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Answer locally instead of calling the API
    #[arg(long)]
    pub test_mode: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.run.max_workers = workers;
        }
        if self.sequential {
            config.run.sequential = true;
        }
        if let Some(max_retries) = self.max_retries {
            config.run.max_retries = max_retries;
        }
        if self.test_mode {
            config.run.test_mode = true;
        }
    }
}
