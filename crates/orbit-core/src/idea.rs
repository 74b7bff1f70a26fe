//! Idea domain model
//!
//! Exported records encode their identifier either as a bare string or as a
//! `{"$oid": "..."}` wrapper. Both collapse into [`IdeaId`] at deserialization;
//! nothing past ingestion ever sees the wrapped form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::category::Category;

/// Canonical idea identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IdeaId(String);

impl IdeaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize any of the known ID encodings.
    ///
    /// Returns `None` for null, empty strings and `{"$oid": null}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(Self(s.clone())),
            Value::Object(map) => match map.get("$oid") {
                Some(inner) => Self::from_value(inner),
                None => Some(Self(value.to_string())),
            },
            other => Some(Self(other.to_string())),
        }
    }
}

impl fmt::Display for IdeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdeaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for IdeaId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        IdeaId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid idea id: {}", value)))
    }
}

/// A single idea record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    #[serde(rename = "_id", alias = "id")]
    pub id: IdeaId,

    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Attached by the merge step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    /// Fields the pipeline does not interpret, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Idea {
    pub fn new(id: impl Into<IdeaId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            category: None,
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Character length of the title, as used by text-limit batching
    pub fn title_len(&self) -> usize {
        self.title.chars().count()
    }
}

impl From<String> for IdeaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of turning raw exported ideas into categorization input
#[derive(Debug, Clone, Default)]
pub struct PreparedIdeas {
    pub ideas: Vec<Idea>,
    /// Ideas with neither title nor description
    pub skipped: Vec<IdeaId>,
}

/// Fold each idea's description into its title.
///
/// `"title: description"` when both are present, otherwise whichever one is
/// non-empty. Ideas with no text at all are skipped.
pub fn prepare_for_categorization(ideas: Vec<Idea>) -> PreparedIdeas {
    let mut prepared = PreparedIdeas::default();

    for idea in ideas {
        let title = idea.title.trim();
        let description = idea.description.as_deref().map(str::trim).unwrap_or("");

        let text = match (title.is_empty(), description.is_empty()) {
            (false, false) => format!("{}: {}", title, description),
            (false, true) => title.to_string(),
            (true, false) => description.to_string(),
            (true, true) => {
                prepared.skipped.push(idea.id);
                continue;
            }
        };

        prepared.ideas.push(Idea::new(idea.id, text));
    }

    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_normalization() {
        assert_eq!(IdeaId::from_value(&json!("abc")), Some(IdeaId::new("abc")));
        assert_eq!(
            IdeaId::from_value(&json!({"$oid": "64f0c2"})),
            Some(IdeaId::new("64f0c2"))
        );
        assert_eq!(IdeaId::from_value(&json!(42)), Some(IdeaId::new("42")));
        assert_eq!(IdeaId::from_value(&json!(null)), None);
        assert_eq!(IdeaId::from_value(&json!("")), None);
        assert_eq!(IdeaId::from_value(&json!({"$oid": null})), None);
    }

    #[test]
    fn test_deserialize_wrapped_and_bare_ids() {
        let ideas: Vec<Idea> = serde_json::from_value(json!([
            {"_id": {"$oid": "1"}, "title": "Solar kiosk"},
            {"id": "2", "title": "Tutor marketplace", "description": "peer tutoring"},
        ]))
        .unwrap();

        assert_eq!(ideas[0].id.as_str(), "1");
        assert_eq!(ideas[1].id.as_str(), "2");
        assert_eq!(ideas[1].description.as_deref(), Some("peer tutoring"));
    }

    #[test]
    fn test_serialize_bare_id_and_passthrough_fields() {
        let idea: Idea = serde_json::from_value(json!({
            "_id": {"$oid": "9"},
            "title": null,
            "language": "en"
        }))
        .unwrap();

        assert_eq!(idea.title, "");
        let out = serde_json::to_value(&idea).unwrap();
        assert_eq!(out["_id"], json!("9"));
        assert_eq!(out["language"], json!("en"));
        assert!(out.get("category").is_none());
    }

    #[test]
    fn test_prepare_for_categorization() {
        let ideas = vec![
            Idea::new("1", "Drone delivery").with_description("for rural clinics"),
            Idea::new("2", "Recipe app"),
            Idea::new("3", "").with_description("Carbon tracker"),
            Idea::new("4", "  ").with_description(""),
        ];

        let prepared = prepare_for_categorization(ideas);

        assert_eq!(prepared.ideas.len(), 3);
        assert_eq!(prepared.ideas[0].title, "Drone delivery: for rural clinics");
        assert_eq!(prepared.ideas[1].title, "Recipe app");
        assert_eq!(prepared.ideas[2].title, "Carbon tracker");
        assert_eq!(prepared.skipped, vec![IdeaId::new("4")]);
    }
}
