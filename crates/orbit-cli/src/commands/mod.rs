pub mod categorize;
pub mod completions;
pub mod merge;
pub mod plan;
pub mod prepare;
pub mod tally;

use std::path::Path;

use anyhow::{Context, Result};
use orbit_core::{Idea, io};

/// Load a JSON array of ideas
pub fn load_ideas(path: &Path) -> Result<Vec<Idea>> {
    let ideas: Vec<Idea> = io::load_json(path)
        .with_context(|| format!("Failed to load ideas from {}", path.display()))?;
    tracing::info!(count = ideas.len(), path = %path.display(), "Loaded ideas");
    Ok(ideas)
}

/// Fails on an empty input, since there is nothing to plan or merge
pub fn ensure_not_empty(ideas: &[Idea], path: &Path) -> Result<()> {
    if ideas.is_empty() {
        anyhow::bail!("No ideas found in {}", path.display());
    }
    Ok(())
}
