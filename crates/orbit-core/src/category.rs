//! Category taxonomy
//!
//! The language model is asked to pick from a fixed list, but labels outside
//! that list are accepted as [`Category::Freeform`] so they can be reported
//! instead of rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::idea::IdeaId;

/// Categories offered to the model in the prompt
pub const PRIMARY_CATEGORIES: &[&str] = &[
    "Administrative Services",
    "Agriculture and Farming",
    "Angel Investing",
    "Apps",
    "Artificial Intelligence",
    "Arts",
    "Biotechnology",
    "Climate Tech",
    "Clothing and Apparel",
    "Commerce and Shopping",
    "Community and Lifestyle",
    "Construction",
    "Consumer Electronics",
    "Consumer Goods",
    "Content and Publishing",
    "Corporate Services",
    "Data Analytics",
    "Design",
    "Education",
    "Energy",
    "Entertainment",
    "Events",
    "Financial Services",
    "Food and Beverage",
    "Gaming",
    "Government and Military",
    "Hardware",
    "Health Care",
    "Information Technology",
    "Internet Services",
    "Lending and Investments",
    "Manufacturing",
    "Media and Entertainment",
    "Mobile",
    "Music and Audio",
    "Natural Resources",
    "Navigation and Mapping",
    "Payments",
    "Platforms",
    "Privacy and Security",
    "Private Equity",
    "Professional Services",
    "Public Admin and Safety",
    "Real Estate",
    "Retail",
    "Sales and Marketing",
    "Science and Engineering",
    "Social and Non-Profit",
    "Software",
    "Sports",
    "Sustainability",
    "Transportation",
    "Travel and Tourism",
    "Venture Capital",
];

/// Labels the model has been seen returning that are still recognized
pub const EXTENDED_CATEGORIES: &[&str] = &[
    "Advertising",
    "Aerospace",
    "Augmented Reality",
    "Automation Nexus",
    "Automotive",
    "Beauty",
    "Consulting",
    "Consumer Services",
    "Engineering",
    "Environmental Services",
    "Home Improvement",
    "Hospitality",
    "Human Resources",
    "Insurance",
    "Internet of Things (IoT)",
    "Legal",
    "Legal Services",
    "Logistics",
    "Productivity",
    "Robotics",
    "Safety",
    "Space",
    "Supply Chain",
    "Supply Chain Management",
    "Telecommunications",
    "Uncategorized",
    "Unknown",
    "Urban Planning",
    "Virtual Reality",
];

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Default category vocabulary as owned strings
pub fn default_categories() -> Vec<String> {
    PRIMARY_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// A category label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Member of the primary or extended taxonomy
    Known(&'static str),
    /// Anything else the model returned
    Freeform(String),
}

impl Category {
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        PRIMARY_CATEGORIES
            .iter()
            .chain(EXTENDED_CATEGORIES)
            .find(|known| **known == label)
            .map(|known| Category::Known(*known))
            .unwrap_or_else(|| Category::Freeform(label.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Known(label) => *label,
            Category::Freeform(label) => label.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Category::Known(_))
    }

    pub fn is_primary(&self) -> bool {
        match self {
            Category::Known(label) => PRIMARY_CATEGORIES.contains(label),
            Category::Freeform(_) => false,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Category::parse(label)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Category::parse(&label))
    }
}

/// One `{_id, category}` pair returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    #[serde(rename = "_id", alias = "id")]
    pub id: IdeaId,
    pub category: Category,
}

/// Category counts over a categorized dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTally {
    pub categories: BTreeMap<String, usize>,
    /// Sum of `categories`
    pub total: usize,
    /// Ideas labeled "Uncategorized", excluded from `total`
    pub uncategorized: usize,
    /// Labels outside the known taxonomy
    pub novel: BTreeSet<String>,
}

impl CategoryTally {
    pub fn from_categories<'a>(categories: impl IntoIterator<Item = &'a Category>) -> Self {
        let mut tally = Self::default();
        for category in categories {
            tally.add(category);
        }
        tally
    }

    pub fn add(&mut self, category: &Category) {
        if category.as_str() == UNCATEGORIZED {
            self.uncategorized += 1;
            return;
        }
        if !category.is_known() {
            self.novel.insert(category.as_str().to_string());
        }
        *self
            .categories
            .entry(category.as_str().to_string())
            .or_insert(0) += 1;
        self.total += 1;
    }

    /// Categories sorted by count, highest first
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<_> = self
            .categories
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_taxonomy_sizes() {
        assert_eq!(PRIMARY_CATEGORIES.len(), 54);
        assert_eq!(EXTENDED_CATEGORIES.len(), 29);
    }

    #[test]
    fn test_parse_known_and_freeform() {
        assert_eq!(Category::parse("Apps"), Category::Known("Apps"));
        assert!(Category::parse(" Health Care ").is_primary());
        assert!(Category::parse("Robotics").is_known());
        assert!(!Category::parse("Robotics").is_primary());
        assert_eq!(
            Category::parse("Space Mining"),
            Category::Freeform("Space Mining".to_string())
        );
    }

    #[test]
    fn test_serde_as_plain_label() {
        let assignment: CategoryAssignment =
            serde_json::from_value(json!({"_id": {"$oid": "1"}, "category": "Quantum Pets"}))
                .unwrap();
        assert_eq!(assignment.id.as_str(), "1");
        assert!(!assignment.category.is_known());

        let out = serde_json::to_value(&assignment).unwrap();
        assert_eq!(out, json!({"_id": "1", "category": "Quantum Pets"}));
    }

    #[test]
    fn test_tally() {
        let labels = ["Apps", "Apps", "Uncategorized", "Quantum Pets", "Energy"];
        let categories: Vec<Category> = labels.iter().map(|l| Category::parse(l)).collect();

        let tally = CategoryTally::from_categories(&categories);

        assert_eq!(tally.total, 4);
        assert_eq!(tally.uncategorized, 1);
        assert_eq!(tally.categories["Apps"], 2);
        assert!(tally.novel.contains("Quantum Pets"));
        assert_eq!(tally.ranked()[0], ("Apps", 2));
    }
}
