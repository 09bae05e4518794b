//! Sample generation results for every stage.

use serde_json::json;

use crate::core::{LorePiece, StageKey, Story};
use crate::stages::StageRegistry;

fn names_for(stage: StageKey) -> [(&'static str, &'static str); 3] {
    match stage {
        StageKey::Character => [
            ("Kaelen Vorr", "A disgraced cartographer who maps forbidden places."),
            ("Isolde Marrow", "A lighthouse keeper who hears the tide speak."),
            ("Brother Ansel", "A monk sworn to forget everything he reads."),
        ],
        StageKey::Faction => [
            ("The Ashen Court", "Nobles who rule from a city that burned."),
            ("Tidewardens", "Sailors bound by oath to the drowned gods."),
            ("The Quiet Ledger", "Bankers who trade in secrets rather than coin."),
        ],
        StageKey::Setting => [
            ("Saltmere", "A harbor city built on the bones of a leviathan."),
            ("The Glass Steppe", "Plains fused to glass by an ancient war."),
            ("Hollowreach", "A forest where every tree is hollow."),
        ],
        StageKey::Event => [
            ("The Long Eclipse", "The sun does not return for forty days."),
            ("A Crown Unclaimed", "The heir vanishes on the eve of coronation."),
            ("The Second Flood", "The sea rises and does not fall."),
        ],
        StageKey::Relic => [
            ("The Tide Compass", "Points toward whatever its holder fears."),
            ("Ashen Seal", "Any letter it closes can only be read aloud."),
            ("Lantern of Marrow", "Shows the room as it was a century ago."),
        ],
        StageKey::FinalStory => [("", ""), ("", ""), ("", "")],
    }
}

/// Three candidates for `stage`, tagged with the stage's category.
///
/// Empty for the story stage.
#[must_use]
pub fn candidates_for(stage: StageKey) -> Vec<LorePiece> {
    let Some(descriptor) = StageRegistry::standard().get(stage) else {
        return Vec::new();
    };
    if !descriptor.kind.is_selectable() {
        return Vec::new();
    }
    names_for(stage)
        .iter()
        .map(|(name, description)| {
            LorePiece::new(descriptor.category, *name, *description).with_attribute("origin", "fixture")
        })
        .collect()
}

/// The story produced from a full set of fixture selections.
#[must_use]
pub fn sample_story() -> Story {
    Story {
        title: "The Compass and the Court".to_string(),
        description: "A cartographer carries a cursed compass into a burning court.".to_string(),
        content: "Kaelen Vorr reached Saltmere on the first dark day of the Long Eclipse...".to_string(),
    }
}

/// The job result a backend would return for `stage`.
#[must_use]
pub fn result_for(stage: StageKey) -> serde_json::Value {
    if stage == StageKey::FinalStory {
        json!(sample_story())
    } else {
        json!(candidates_for(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_carry_category() {
        let relics = candidates_for(StageKey::Relic);
        assert_eq!(relics.len(), 3);
        assert!(relics.iter().all(|r| r.kind == "relic"));
        assert!(candidates_for(StageKey::FinalStory).is_empty());
    }

    #[test]
    fn test_result_parses_back() {
        let story: Story = serde_json::from_value(result_for(StageKey::FinalStory)).unwrap();
        assert_eq!(story, sample_story());
        let pieces: Vec<LorePiece> = serde_json::from_value(result_for(StageKey::Event)).unwrap();
        assert_eq!(pieces, candidates_for(StageKey::Event));
    }
}
