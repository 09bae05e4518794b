//! Static, ordered stage registry.

use serde::Serialize;

use crate::core::{StageKey, StageKind};

/// Display metadata and identity of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    /// Unique stage key.
    pub key: StageKey,
    /// Position in the sequence, starting at 0.
    pub position: usize,
    /// Title shown above the stage.
    pub title: &'static str,
    /// One-line prompt shown under the title.
    pub description: &'static str,
    /// Category label; candidates produced by the stage carry it as type tag.
    pub category: &'static str,
    /// What the stage's job produces.
    pub kind: StageKind,
}

const STANDARD_STAGES: [StageDescriptor; 6] = [
    StageDescriptor {
        key: StageKey::Character,
        position: 0,
        title: "Choose Your Character",
        description: "Pick the protagonist whose story will unfold.",
        category: "character",
        kind: StageKind::Candidates,
    },
    StageDescriptor {
        key: StageKey::Faction,
        position: 1,
        title: "Choose a Faction",
        description: "Pick the power your character is bound to.",
        category: "faction",
        kind: StageKind::Candidates,
    },
    StageDescriptor {
        key: StageKey::Setting,
        position: 2,
        title: "Choose a Setting",
        description: "Pick the land where the story takes place.",
        category: "setting",
        kind: StageKind::Candidates,
    },
    StageDescriptor {
        key: StageKey::Event,
        position: 3,
        title: "Choose an Event",
        description: "Pick the event that sets the story in motion.",
        category: "event",
        kind: StageKind::Candidates,
    },
    StageDescriptor {
        key: StageKey::Relic,
        position: 4,
        title: "Choose a Relic",
        description: "Pick the artifact at the heart of the tale.",
        category: "relic",
        kind: StageKind::Candidates,
    },
    StageDescriptor {
        key: StageKey::FinalStory,
        position: 5,
        title: "Your Story",
        description: "Your choices are woven into a single story.",
        category: "story",
        kind: StageKind::Story,
    },
];

/// Ordered lookup over the stage sequence.
///
/// Holds only `'static` data, so it is `Copy` and safe to share across tasks.
#[derive(Debug, Clone, Copy)]
pub struct StageRegistry {
    stages: &'static [StageDescriptor],
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StageRegistry {
    /// The six-stage lore sequence.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            stages: &STANDARD_STAGES,
        }
    }

    /// All stages in advancement order.
    #[must_use]
    pub const fn all(&self) -> &'static [StageDescriptor] {
        self.stages
    }

    /// Number of stages.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the registry has no stages.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stage the workflow starts at.
    #[must_use]
    pub const fn first(&self) -> &'static StageDescriptor {
        // Registries are only built from non-empty constant tables.
        &self.stages[0]
    }

    /// Looks up a stage descriptor.
    #[must_use]
    pub fn get(&self, key: StageKey) -> Option<&'static StageDescriptor> {
        self.stages.iter().find(|stage| stage.key == key)
    }

    /// Position of `key` in the sequence.
    #[must_use]
    pub fn index_of(&self, key: StageKey) -> Option<usize> {
        self.stages.iter().position(|stage| stage.key == key)
    }

    /// The stage after `key`, or `None` if `key` is last or unknown.
    #[must_use]
    pub fn next(&self, key: StageKey) -> Option<StageKey> {
        let index = self.index_of(key)?;
        self.stages.get(index + 1).map(|stage| stage.key)
    }

    /// Returns true if `key` is the last stage.
    #[must_use]
    pub fn is_last(&self, key: StageKey) -> bool {
        self.stages.last().is_some_and(|stage| stage.key == key)
    }

    /// Stages strictly before `key` that end with a user selection.
    #[must_use]
    pub fn selectable_before(&self, key: StageKey) -> Vec<StageKey> {
        let end = self.index_of(key).unwrap_or(0);
        self.stages[..end]
            .iter()
            .filter(|stage| stage.kind.is_selectable())
            .map(|stage| stage.key)
            .collect()
    }
}
