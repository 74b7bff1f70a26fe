use std::path::PathBuf;

use anyhow::{Context, Result};
use orbit_core::{Category, CategoryTally, io};
use serde_json::Value;

pub fn handle(input: PathBuf, json: bool) -> Result<()> {
    let entries: Vec<Value> = io::load_json(&input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let tally = tally_entries(&entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&tally)?);
        return Ok(());
    }

    println!("Categories ({} categorized):", tally.total);
    for (label, count) in tally.ranked() {
        let share = count as f64 / tally.total as f64 * 100.0;
        println!("  {:<40} {:>6}  {:>5.1}%", label, count, share);
    }
    if tally.uncategorized > 0 {
        println!("\nUncategorized: {}", tally.uncategorized);
    }
    if !tally.novel.is_empty() {
        println!("\nLabels outside the taxonomy ({}):", tally.novel.len());
        for label in &tally.novel {
            println!("  {}", label);
        }
    }

    Ok(())
}

/// Entries without a string `category` are ignored
fn tally_entries(entries: &[Value]) -> CategoryTally {
    let categories: Vec<Category> = entries
        .iter()
        .filter_map(|entry| entry.get("category").and_then(Value::as_str))
        .filter(|label| !label.trim().is_empty())
        .map(Category::parse)
        .collect();
    CategoryTally::from_categories(&categories)
}
