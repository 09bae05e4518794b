//! Cross-stage map of accepted selections.

use serde::ser::{Serialize, Serializer};
use tracing::warn;

use crate::core::{LorePiece, StageKey};

/// The selection accepted for each completed stage, in visit order.
///
/// Serializes as a JSON object keyed by stage name, preserving visit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedLore {
    entries: Vec<(StageKey, LorePiece)>,
}

impl SelectedLore {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the selection for `stage`.
    ///
    /// A second record for the same stage replaces the first in place.
    pub fn record(&mut self, stage: StageKey, piece: LorePiece) {
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| *key == stage) {
            warn!(stage = %stage, "Replacing existing selection");
            entry.1 = piece;
        } else {
            self.entries.push((stage, piece));
        }
    }

    /// Returns the selection for `stage`.
    #[must_use]
    pub fn get(&self, stage: StageKey) -> Option<&LorePiece> {
        self.entries
            .iter()
            .find(|(key, _)| *key == stage)
            .map(|(_, piece)| piece)
    }

    /// Returns true if `stage` has a selection.
    #[must_use]
    pub fn contains(&self, stage: StageKey) -> bool {
        self.get(stage).is_some()
    }

    /// Number of recorded stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stage keys in visit order.
    #[must_use]
    pub fn stages(&self) -> Vec<StageKey> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }

    /// Iterates entries in visit order.
    pub fn iter(&self) -> impl Iterator<Item = (StageKey, &LorePiece)> {
        self.entries.iter().map(|(key, piece)| (*key, piece))
    }

    /// The subset of `required` that has no selection yet.
    #[must_use]
    pub fn missing(&self, required: &[StageKey]) -> Vec<StageKey> {
        required
            .iter()
            .copied()
            .filter(|stage| !self.contains(*stage))
            .collect()
    }

    /// Drops every selection.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Serialize for SelectedLore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(key, piece)| (key.as_str(), piece)))
    }
}
