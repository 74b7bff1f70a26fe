use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use orbit_config::Config;
use orbit_core::io;
use orbit_engine::{Categorizer, RunReport, format_duration};
use orbit_tokens::Model;

use super::{ensure_not_empty, load_ideas};
use crate::cli::{PlannerArgs, RunArgs};

/// Files written by one run
struct OutputPaths {
    results: PathBuf,
    checkpoint: PathBuf,
    stats: PathBuf,
    metrics: PathBuf,
    unresolved: PathBuf,
}

impl OutputPaths {
    fn new(dir: &Path, model: &str) -> Result<Self> {
        Ok(Self {
            results: io::timestamped_path(dir, Some("categorized_ideas"), Some(model), "json")?,
            checkpoint: io::timestamped_path(
                &dir.join("partial_responses"),
                Some(model),
                Some("preliminary_batch_responses"),
                "json",
            )?,
            stats: io::timestamped_path(&dir.join("stats"), Some("batch_stats"), Some(model), "json")?,
            metrics: io::timestamped_path(
                &dir.join("metrics"),
                Some("performance_metrics"),
                Some(model),
                "json",
            )?,
            unresolved: io::timestamped_path(dir, Some("unresolved_ideas"), Some(model), "json")?,
        })
    }
}

pub async fn handle(
    mut config: Config,
    input: PathBuf,
    output_dir: Option<PathBuf>,
    no_checkpoint: bool,
    planner: PlannerArgs,
    run: RunArgs,
) -> Result<()> {
    planner.apply(&mut config);
    run.apply(&mut config);
    config.validate()?;

    let load_started = Instant::now();
    let ideas = load_ideas(&input)?;
    ensure_not_empty(&ideas, &input)?;
    let load_time = load_started.elapsed();

    let model = Model::resolve(&config.model);
    let output_dir = output_dir.unwrap_or_else(|| config.paths.output_dir.clone());
    let paths = OutputPaths::new(&output_dir, model.as_str())?;

    let client = orbit_llm::build_client(&config)?;
    let mut categorizer = Categorizer::new(config, client);
    if !no_checkpoint {
        categorizer = categorizer.with_checkpoint(&paths.checkpoint);
    }

    let mut report = categorizer.run(ideas).await?;
    report.metrics.phases.load = load_time;
    report.metrics.total += load_time;

    let save_started = Instant::now();
    save_outputs(&report, &paths)?;
    report.metrics.phases.saving += save_started.elapsed();

    let summary = report
        .metrics
        .summary(report.total_ideas, report.assignments.len());
    io::save_json(&summary, &paths.metrics)?;

    print_summary(&report, &paths);
    Ok(())
}

fn save_outputs(report: &RunReport, paths: &OutputPaths) -> Result<()> {
    io::save_json(&report.assignments, &paths.results)?;
    io::save_json(&report.stats, &paths.stats)?;
    if !report.unresolved.is_empty() {
        io::save_json(&report.unresolved, &paths.unresolved)?;
    }
    Ok(())
}

fn print_summary(report: &RunReport, paths: &OutputPaths) {
    let stats = &report.stats;

    println!(
        "✓ Categorized {} of {} ideas in {}",
        report.assignments.len(),
        report.total_ideas,
        format_duration(report.metrics.total)
    );
    println!("  Batches: {}", stats.batches.len());
    println!(
        "  Tokens: {} input, {} output, {} total",
        stats.input_token_count, stats.output_token_count, stats.total_token_count
    );
    println!("  Estimated cost: ${:.4}", stats.estimated_cost);
    println!("  Actual cost: ${:.4}", stats.actual_cost);
    println!("  Results: {}", paths.results.display());
    println!("  Stats: {}", paths.stats.display());
    println!("  Metrics: {}", paths.metrics.display());

    if !report.is_complete() {
        println!(
            "\n  Warning: {} ideas could not be categorized",
            report.unresolved.len()
        );
        println!("  Saved to {}", paths.unresolved.display());
    }
}
