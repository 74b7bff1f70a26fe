//! Merging separately produced category labels into the idea dataset

use std::collections::HashMap;
use std::path::Path;

use orbit_core::{Category, Error, Idea, IdeaId, Result, io};
use serde_json::Value;

/// `id -> category` lookup built from a categorized-ideas file
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    entries: HashMap<IdeaId, Category>,
}

impl CategoryMap {
    /// Build from raw `{_id, category}` entries.
    ///
    /// Entries without a usable ID or a non-empty string category are
    /// skipped. A later entry for the same ID overwrites an earlier one.
    pub fn from_entries(entries: &[Value]) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            let id = entry
                .get("_id")
                .or_else(|| entry.get("id"))
                .and_then(IdeaId::from_value);
            let category = entry
                .get("category")
                .and_then(Value::as_str)
                .filter(|label| !label.trim().is_empty())
                .map(Category::parse);

            if let (Some(id), Some(category)) = (id, category) {
                map.insert(id, category);
            }
        }
        Self { entries: map }
    }

    pub fn get(&self, id: &IdeaId) -> Option<&Category> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(IdeaId, Category)> for CategoryMap {
    fn from_iter<I: IntoIterator<Item = (IdeaId, Category)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Attach categories to ideas found in `map`.
///
/// Every idea is returned, in order. Unmatched ideas are passed through
/// unchanged. Returns the ideas and how many were matched.
pub fn merge_categories(ideas: Vec<Idea>, map: &CategoryMap) -> (Vec<Idea>, usize) {
    let mut matched = 0;
    let merged = ideas
        .into_iter()
        .map(|mut idea| {
            if let Some(category) = map.get(&idea.id) {
                idea.category = Some(category.clone());
                matched += 1;
            }
            idea
        })
        .collect();
    (merged, matched)
}

/// Merges a categorized-ideas file into a canonical idea list
#[derive(Debug, Clone)]
pub struct CategoryMerger {
    ideas: Vec<Idea>,
}

impl CategoryMerger {
    pub fn new(ideas: Vec<Idea>) -> Self {
        Self { ideas }
    }

    /// Load `categorized_file` and merge it into the ideas.
    ///
    /// Categorization is an enrichment: if the file cannot be read, is not
    /// JSON, or is not an array, the error is logged and the ideas are
    /// returned unmodified.
    pub fn load_and_merge_categories(&self, categorized_file: &Path) -> Vec<Idea> {
        tracing::info!(path = %categorized_file.display(), "Loading pre-categorized ideas");

        match self.try_merge(categorized_file) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!(
                    path = %categorized_file.display(),
                    error = %e,
                    "Error merging categories, continuing without them"
                );
                self.ideas.clone()
            }
        }
    }

    fn try_merge(&self, categorized_file: &Path) -> Result<Vec<Idea>> {
        let value: Value = io::load_json(categorized_file)?;
        let Value::Array(entries) = value else {
            return Err(Error::InvalidData(
                "categorized ideas file must contain a list of objects".to_string(),
            ));
        };
        tracing::info!(entries = entries.len(), "Loaded pre-categorized ideas");

        let map = CategoryMap::from_entries(&entries);
        tracing::info!(valid = map.len(), "Built category map");

        let (merged, matched) = merge_categories(self.ideas.clone(), &map);
        tracing::info!(
            matched,
            total = merged.len(),
            "Merged categories into ideas"
        );
        Ok(merged)
    }
}
