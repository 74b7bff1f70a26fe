use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use orbit_config::Config;
use orbit_core::BatchLoad;
use orbit_engine::{Categorizer, PlanPreview};
use orbit_llm::DummyClient;

use super::{ensure_not_empty, load_ideas};
use crate::cli::PlannerArgs;

pub fn handle(mut config: Config, input: PathBuf, json: bool, planner: PlannerArgs) -> Result<()> {
    planner.apply(&mut config);
    config.validate()?;

    let ideas = load_ideas(&input)?;
    ensure_not_empty(&ideas, &input)?;

    // Planning never sends a request
    let categorizer = Categorizer::new(config, Arc::new(DummyClient::new()));
    let preview = categorizer.preview(&ideas)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print_preview(&preview);
    }

    Ok(())
}

fn print_preview(preview: &PlanPreview) {
    println!("Plan for {} ({} batches):", preview.model, preview.batches.len());
    for batch in &preview.batches {
        let load = match batch.load {
            BatchLoad::Tokens(tokens) => format!("{} tokens", tokens),
            BatchLoad::Chars(chars) => format!("{} chars", chars),
            BatchLoad::Ideas(ideas) => format!("{} ideas", ideas),
        };
        let cost = preview
            .stats
            .get(batch.number)
            .and_then(|stats| stats.estimated_cost)
            .map(|cost| format!("${:.4}", cost))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  Batch {:>4}: {:>5} ideas  {:>14}  {}",
            batch.number, batch.ideas, load, cost
        );
    }

    let stats = &preview.stats;
    println!("\nIdeas: {}", stats.total_ideas());
    println!(
        "Estimated tokens: {} input, {} output",
        stats.input_token_count, stats.output_token_count
    );
    println!("Estimated cost: ${:.4}", stats.estimated_cost);
    println!(
        "Recommended delay between requests: {:.2}s",
        preview.recommended_delay_secs
    );
}
