//! Generated lore: stage candidates and the assembled story.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One generated option for a stage.
///
/// Stage-specific descriptive fields (a setting's `landscape`, a relic's
/// `history`) are kept verbatim in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorePiece {
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Type tag; matches the category of the stage that produced it.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Remaining stage-specific fields.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl LorePiece {
    /// Creates a piece with no extra attributes.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a stage-specific attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns a string attribute, if present.
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The story document produced by the final stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story title.
    pub title: String,
    /// One-paragraph synopsis.
    #[serde(default)]
    pub description: String,
    /// Full story text.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_lore_piece_flattens_attributes() {
        let piece: LorePiece = serde_json::from_value(json!({
            "name": "The Ashen Steppe",
            "description": "A plain of cinders",
            "type": "setting",
            "landscape": "grey dunes",
            "dangers": "ember storms"
        }))
        .unwrap();

        assert_eq!(piece.kind, "setting");
        assert_eq!(piece.attribute_str("landscape"), Some("grey dunes"));
        assert_eq!(piece.attribute_str("dangers"), Some("ember storms"));
        assert_eq!(piece.attributes.len(), 2);
    }

    #[test]
    fn test_lore_piece_serializes_type_tag() {
        let piece = LorePiece::new("relic", "Crown of Thorns", "A circlet of iron briars")
            .with_attribute("history", "Forged in the first war");
        let value = serde_json::to_value(&piece).unwrap();

        assert_eq!(
            value,
            json!({
                "name": "Crown of Thorns",
                "description": "A circlet of iron briars",
                "type": "relic",
                "history": "Forged in the first war"
            })
        );
    }

    #[test]
    fn test_story_deserialize() {
        let story: Story = serde_json::from_value(json!({
            "title": "Embers",
            "content": "Once upon a time"
        }))
        .unwrap();
        assert_eq!(story.title, "Embers");
        assert!(story.description.is_empty());
    }
}
