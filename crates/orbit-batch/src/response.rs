//! Cleaning and validating model responses

use std::collections::HashSet;

use orbit_core::{Batch, CategoryAssignment, Error, Idea, IdeaId, Result};
use serde::Serialize;
use serde_json::Value;

const FENCE: &str = "```";

/// Result of matching a parsed response against the batch it answers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Assignments for ideas of the batch, in response order
    pub assigned: Vec<CategoryAssignment>,
    /// Ideas of the batch the response did not label
    pub missing: Vec<Idea>,
    /// IDs in the response that do not belong to the batch
    pub unexpected: Vec<IdeaId>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseProcessor;

impl ResponseProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Strip Markdown code fences and surrounding whitespace.
    ///
    /// An opening fence (optionally tagged `json`) followed by a newline is
    /// removed together with a closing fence at the end of the text. This is
    /// repeated until nothing changes, so the result is a fixed point and
    /// cleaning twice equals cleaning once. Text without fences is only
    /// trimmed.
    pub fn clean_response(&self, raw: &str, batch: Option<u32>) -> String {
        let mut text = raw.trim();
        loop {
            let next = strip_fence(text).trim();
            if next == text {
                break;
            }
            text = next;
        }

        if text.len() != raw.len() {
            tracing::trace!(
                batch,
                raw_len = raw.len(),
                cleaned_len = text.len(),
                "Cleaned response"
            );
        }
        text.to_string()
    }

    /// Clean and parse a response as JSON.
    ///
    /// On failure the parse error and the raw, uncleaned text are logged with
    /// the batch number before the error is returned.
    pub fn parse_json_response(&self, raw: &str, batch: Option<u32>) -> Result<Value> {
        let cleaned = self.clean_response(raw, batch);
        serde_json::from_str(&cleaned).map_err(|source| {
            tracing::error!(batch, error = %source, "Error parsing JSON response");
            tracing::error!(batch, raw_response = raw, "Raw response");
            Error::ResponseParse { batch, source }
        })
    }

    /// Parse a response into `{_id, category}` assignments.
    ///
    /// Accepts a top-level array, or an object whose only array-valued field
    /// holds the assignments (some models wrap the array in a key).
    pub fn parse_assignments(
        &self,
        raw: &str,
        batch: Option<u32>,
    ) -> Result<Vec<CategoryAssignment>> {
        let value = self.parse_json_response(raw, batch)?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => {
                let mut arrays: Vec<Vec<Value>> = map
                    .into_iter()
                    .filter_map(|(_, value)| match value {
                        Value::Array(items) => Some(items),
                        _ => None,
                    })
                    .collect();
                if arrays.len() != 1 {
                    return Err(shape_error(
                        batch,
                        format!("expected one array in object, found {}", arrays.len()),
                    ));
                }
                arrays.remove(0)
            }
            other => {
                return Err(shape_error(
                    batch,
                    format!("expected a JSON array, got {}", json_kind(&other)),
                ));
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item)
                    .map_err(|e| shape_error(batch, format!("entry {}: {}", index, e)))
            })
            .collect()
    }

    /// Match assignments against the ideas of `batch`.
    ///
    /// The first assignment for an ID wins; later duplicates are dropped.
    pub fn reconcile(&self, batch: &Batch, assignments: Vec<CategoryAssignment>) -> BatchOutcome {
        let expected: HashSet<&IdeaId> = batch.ids().collect();
        let mut seen: HashSet<IdeaId> = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for assignment in assignments {
            if !expected.contains(&assignment.id) {
                outcome.unexpected.push(assignment.id);
                continue;
            }
            if seen.insert(assignment.id.clone()) {
                outcome.assigned.push(assignment);
            } else {
                tracing::debug!(batch = batch.number, id = %assignment.id, "Duplicate assignment dropped");
            }
        }

        outcome.missing = batch
            .ideas
            .iter()
            .filter(|idea| !seen.contains(&idea.id))
            .cloned()
            .collect();

        if !outcome.missing.is_empty() || !outcome.unexpected.is_empty() {
            tracing::warn!(
                batch = batch.number,
                assigned = outcome.assigned.len(),
                missing = outcome.missing.len(),
                unexpected = outcome.unexpected.len(),
                "Response does not match batch"
            );
        }
        outcome
    }
}

/// One pass of fence removal; returns `text` unchanged when not fenced
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let Some(body) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return text;
    };
    body.strip_suffix(FENCE).unwrap_or(body)
}

fn shape_error(batch: Option<u32>, reason: String) -> Error {
    tracing::error!(batch, %reason, "Unexpected response shape");
    Error::ResponseShape { batch, reason }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::{BatchLoad, Category};
    use proptest::prelude::*;

    fn batch(ids: &[&str]) -> Batch {
        Batch {
            number: 4,
            ideas: ids.iter().map(|id| Idea::new(*id, format!("title {id}"))).collect(),
            load: BatchLoad::Ideas(ids.len()),
        }
    }

    #[test]
    fn test_clean_fenced_json() {
        let processor = ResponseProcessor::new();
        assert_eq!(
            processor.clean_response("```json\n{\"a\":1}\n```", Some(1)),
            r#"{"a":1}"#
        );
        assert_eq!(processor.clean_response("```\n[1, 2]\n```", None), "[1, 2]");
    }

    #[test]
    fn test_clean_leaves_plain_text() {
        let processor = ResponseProcessor::new();
        assert_eq!(processor.clean_response("  [1]  \n", None), "[1]");
        assert_eq!(processor.clean_response("no fences here", None), "no fences here");
        assert_eq!(processor.clean_response("```", None), "```");
    }

    #[test]
    fn test_clean_nested_fences() {
        let processor = ResponseProcessor::new();
        let raw = "```json\n```json\n[]\n```\n```";
        assert_eq!(processor.clean_response(raw, None), "[]");
    }

    #[test]
    fn test_parse_error_carries_batch() {
        let processor = ResponseProcessor::new();
        let err = processor
            .parse_json_response("```json\n{not json\n```", Some(12))
            .unwrap_err();
        assert!(matches!(err, Error::ResponseParse { batch: Some(12), .. }));
        assert!(err.to_string().contains("batch 12"));
    }

    #[test]
    fn test_parse_assignments_array_and_wrapped() {
        let processor = ResponseProcessor::new();
        let raw = r#"```json
[{"_id": "a", "category": "Apps"}, {"_id": {"$oid": "b"}, "category": "Moon Farming"}]
```"#;
        let assignments = processor.parse_assignments(raw, Some(1)).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[1].id.as_str(), "b");
        assert_eq!(
            assignments[1].category,
            Category::Freeform("Moon Farming".to_string())
        );

        let wrapped = r#"{"ideas": [{"_id": "a", "category": "Apps"}], "note": "done"}"#;
        assert_eq!(processor.parse_assignments(wrapped, None).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_assignments_rejects_other_shapes() {
        let processor = ResponseProcessor::new();

        let err = processor.parse_assignments(r#""just text""#, Some(2)).unwrap_err();
        assert!(matches!(err, Error::ResponseShape { batch: Some(2), .. }));

        let err = processor
            .parse_assignments(r#"[{"category": "Apps"}]"#, Some(3))
            .unwrap_err();
        assert_eq!(err.batch(), Some(3));
    }

    #[test]
    fn test_reconcile() {
        let processor = ResponseProcessor::new();
        let batch = batch(&["a", "b", "c"]);
        let assignments = vec![
            CategoryAssignment {
                id: "a".into(),
                category: Category::parse("Apps"),
            },
            CategoryAssignment {
                id: "a".into(),
                category: Category::parse("Energy"),
            },
            CategoryAssignment {
                id: "zzz".into(),
                category: Category::parse("Apps"),
            },
            CategoryAssignment {
                id: "c".into(),
                category: Category::parse("Energy"),
            },
        ];

        let outcome = processor.reconcile(&batch, assignments);

        assert_eq!(outcome.assigned.len(), 2);
        assert_eq!(outcome.assigned[0].category.as_str(), "Apps");
        assert_eq!(outcome.missing.len(), 1);
        assert_eq!(outcome.missing[0].id.as_str(), "b");
        assert_eq!(outcome.unexpected, vec![IdeaId::from("zzz")]);
        assert!(!outcome.is_complete());
    }

    proptest! {
        #[test]
        fn prop_clean_is_idempotent(text in "(```(json)?\n)?[ a-z\\[\\]{}\n`]{0,40}(\n```)?") {
            let processor = ResponseProcessor::new();
            let once = processor.clean_response(&text, None);
            let twice = processor.clean_response(&once, None);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_clean_is_idempotent_any_text(text in "\\PC{0,60}") {
            let processor = ResponseProcessor::new();
            let once = processor.clean_response(&text, None);
            prop_assert_eq!(processor.clean_response(&once, None), once.clone());
        }
    }
}
