use std::path::PathBuf;

use anyhow::Result;
use orbit_config::Config;
use orbit_core::io;
use orbit_engine::CategoryMerger;

use super::load_ideas;

pub fn handle(
    config: &Config,
    ideas: PathBuf,
    categorized: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let ideas = load_ideas(&ideas)?;
    let total = ideas.len();

    let merged = CategoryMerger::new(ideas).load_and_merge_categories(&categorized);
    let labeled = merged.iter().filter(|idea| idea.category.is_some()).count();

    let output = match output {
        Some(path) => path,
        None => io::timestamped_path(&config.paths.output_dir, Some("merged_ideas"), None, "json")?,
    };
    io::save_json(&merged, &output)?;

    println!("✓ Merged categories into {} ideas", total);
    println!("  With category: {}", labeled);
    println!("  Without category: {}", total - labeled);
    println!("  Saved to {}", output.display());

    Ok(())
}
