//! Categorization prompt rendering
//!
//! The request embeds the category vocabulary and a JSON array of
//! `{_id, title}` objects. The model is expected to answer with a JSON array
//! of `{_id, category}` objects, one per idea, optionally wrapped in a
//! Markdown code fence.

use serde::Serialize;

use crate::Result;
use crate::category::PRIMARY_CATEGORIES;
use crate::idea::{Idea, IdeaId};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for categorizing startup ideas.";

/// Shape the model is told to answer with
pub const RESPONSE_SHAPE: &str = r#"{ "_id": original id, "category": chosen category }"#;

/// The idea array is one compact object per line between these
pub const IDEAS_OPEN: &str = "[\n";
pub const IDEAS_CLOSE: &str = "\n]";
pub const IDEA_SEPARATOR: &str = ",\n";

#[derive(Serialize)]
struct PromptIdea<'a> {
    #[serde(rename = "_id")]
    id: &'a IdeaId,
    title: &'a str,
}

impl<'a> From<&'a Idea> for PromptIdea<'a> {
    fn from(idea: &'a Idea) -> Self {
        Self {
            id: &idea.id,
            title: &idea.title,
        }
    }
}

/// Builds the literal request text for a batch
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Everything that precedes the ideas: instructions and vocabulary.
    ///
    /// An empty `categories` slice falls back to the primary taxonomy.
    pub fn header(&self, categories: &[String]) -> Result<String> {
        let vocabulary = if categories.is_empty() {
            serde_json::to_string(PRIMARY_CATEGORIES)?
        } else {
            serde_json::to_string(categories)?
        };

        Ok(format!(
            "You are an expert startup idea categorizer. \
             Categorize each of the following ideas into one of the given categories.\n\n\
             Categories: {vocabulary}\n\n\
             Do not create additional categories outside of the given list. \
             For each idea, return an object with the original '_id', and an additional \
             field 'category' indicating the chosen category. \
             Return your answer as a JSON array of objects with the following structure:\n\
             {RESPONSE_SHAPE}\n\n\
             Here are the ideas:\n"
        ))
    }

    /// One idea as it appears inside the prompt's JSON array
    pub fn render_idea(&self, idea: &Idea) -> Result<String> {
        Ok(serde_json::to_string(&PromptIdea::from(idea))?)
    }

    /// The JSON array of ideas, built only from [`IDEAS_OPEN`],
    /// [`render_idea`](Self::render_idea) output joined by
    /// [`IDEA_SEPARATOR`], and [`IDEAS_CLOSE`]
    pub fn render_ideas(&self, ideas: &[Idea]) -> Result<String> {
        let rendered = ideas
            .iter()
            .map(|idea| self.render_idea(idea))
            .collect::<Result<Vec<String>>>()?;
        Ok(format!(
            "{IDEAS_OPEN}{}{IDEAS_CLOSE}",
            rendered.join(IDEA_SEPARATOR)
        ))
    }

    pub fn categorization_prompt(&self, categories: &[String], ideas: &[Idea]) -> Result<String> {
        let mut prompt = self.header(categories)?;
        prompt.push_str(&self.render_ideas(ideas)?);
        Ok(prompt)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_vocabulary_and_ideas() {
        let builder = PromptBuilder::new();
        let categories = vec!["Apps".to_string(), "Energy".to_string()];
        let ideas = vec![Idea::new("a1", "Solar charging bench")];

        let prompt = builder.categorization_prompt(&categories, &ideas).unwrap();

        assert!(prompt.contains(r#"Categories: ["Apps","Energy"]"#));
        assert!(prompt.contains(r#""_id":"a1""#));
        assert!(prompt.contains("Solar charging bench"));
        assert!(prompt.starts_with(&builder.header(&categories).unwrap()));
    }

    #[test]
    fn test_ideas_array_is_joined_rendered_ideas() {
        let builder = PromptBuilder::new();
        let ideas = vec![Idea::new("a1", "Bike \"share\""), Idea::new("a2", "Tutor app")];

        let payload = builder.render_ideas(&ideas).unwrap();
        let expected = format!(
            "{IDEAS_OPEN}{}{IDEA_SEPARATOR}{}{IDEAS_CLOSE}",
            builder.render_idea(&ideas[0]).unwrap(),
            builder.render_idea(&ideas[1]).unwrap()
        );
        assert_eq!(payload, expected);

        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed[1]["_id"], "a2");
        assert_eq!(parsed[0]["title"], "Bike \"share\"");

        let empty: serde_json::Value = serde_json::from_str(&builder.render_ideas(&[]).unwrap()).unwrap();
        assert_eq!(empty, serde_json::json!([]));
    }

    #[test]
    fn test_default_vocabulary() {
        let header = PromptBuilder::new().header(&[]).unwrap();
        assert!(header.contains("Venture Capital"));
    }

    #[test]
    fn test_description_not_sent() {
        let idea = Idea::new("b2", "Meal kits").with_description("secret sauce");
        let rendered = PromptBuilder::new().render_idea(&idea).unwrap();
        assert!(!rendered.contains("secret sauce"));
    }
}
