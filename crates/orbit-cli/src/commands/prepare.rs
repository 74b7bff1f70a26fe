use std::path::PathBuf;

use anyhow::Result;
use orbit_config::Config;
use orbit_core::{io, prepare_for_categorization};

use super::load_ideas;

pub fn handle(config: &Config, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let ideas = load_ideas(&input)?;
    let total = ideas.len();

    let prepared = prepare_for_categorization(ideas);

    let output = match output {
        Some(path) => path,
        None => io::timestamped_path(
            &config.paths.data_dir,
            Some("ideas_for_categorization"),
            None,
            "json",
        )?,
    };
    io::save_json(&prepared.ideas, &output)?;

    println!("✓ Prepared {} of {} ideas", prepared.ideas.len(), total);
    println!("  Saved to {}", output.display());
    if !prepared.skipped.is_empty() {
        println!("  Skipped {} without title or description:", prepared.skipped.len());
        for id in &prepared.skipped {
            println!("    {}", id);
        }
    }

    Ok(())
}
