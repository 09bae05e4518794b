//! Per-stage selection and regeneration gate.

use crate::core::LorePiece;

/// Ephemeral state of one stage visit.
///
/// Whether a job is in flight is owned by the stage machine and passed in,
/// so the tracker stays a plain value with no I/O.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionConstraintTracker {
    selection: Option<LorePiece>,
    has_regenerated: bool,
}

impl SelectionConstraintTracker {
    /// Creates a tracker for a fresh stage visit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a candidate has been selected.
    #[must_use]
    pub const fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    /// Returns true if this visit already used its regeneration.
    #[must_use]
    pub const fn has_regenerated(&self) -> bool {
        self.has_regenerated
    }

    /// The current selection.
    #[must_use]
    pub const fn selection(&self) -> Option<&LorePiece> {
        self.selection.as_ref()
    }

    /// Regeneration is allowed once per visit and never while a job runs.
    #[must_use]
    pub const fn can_regenerate(&self, job_in_flight: bool) -> bool {
        !self.has_regenerated && !job_in_flight
    }

    /// Advancing needs a selection and no running job.
    #[must_use]
    pub const fn can_advance(&self, job_in_flight: bool) -> bool {
        self.has_selection() && !job_in_flight
    }

    /// Records `candidate` as the selection, replacing any previous one.
    ///
    /// Returns true if the selection changed.
    pub fn select(&mut self, candidate: LorePiece) -> bool {
        if self.selection.as_ref() == Some(&candidate) {
            return false;
        }
        self.selection = Some(candidate);
        true
    }

    /// Consumes the regeneration allowance and clears the selection.
    ///
    /// Returns false, changing nothing, if regeneration is not allowed.
    pub fn regenerate(&mut self, job_in_flight: bool) -> bool {
        if !self.can_regenerate(job_in_flight) {
            return false;
        }
        self.has_regenerated = true;
        self.selection = None;
        true
    }

    /// Returns both flags to false; called on every stage change.
    pub fn reset(&mut self) {
        self.selection = None;
        self.has_regenerated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(name: &str) -> LorePiece {
        LorePiece::new("character", name, "")
    }

    #[test]
    fn test_fresh_tracker() {
        let tracker = SelectionConstraintTracker::new();
        assert!(!tracker.has_selection());
        assert!(!tracker.has_regenerated());
        assert!(tracker.can_regenerate(false));
        assert!(!tracker.can_advance(false));
    }

    #[test]
    fn test_select_enables_advance() {
        let mut tracker = SelectionConstraintTracker::new();
        assert!(tracker.select(piece("Aria")));
        assert!(tracker.can_advance(false));
        assert!(!tracker.can_advance(true));
    }

    #[test]
    fn test_select_same_candidate_is_idempotent() {
        let mut tracker = SelectionConstraintTracker::new();
        assert!(tracker.select(piece("Aria")));
        let before = tracker.clone();

        assert!(!tracker.select(piece("Aria")));
        assert_eq!(tracker, before);
    }

    #[test]
    fn test_select_replaces() {
        let mut tracker = SelectionConstraintTracker::new();
        tracker.select(piece("Aria"));
        assert!(tracker.select(piece("Borin")));
        assert_eq!(tracker.selection().map(|p| p.name.as_str()), Some("Borin"));
    }

    #[test]
    fn test_regenerate_once() {
        let mut tracker = SelectionConstraintTracker::new();
        tracker.select(piece("Aria"));

        assert!(tracker.regenerate(false));
        assert!(tracker.has_regenerated());
        assert!(!tracker.has_selection());

        assert!(!tracker.regenerate(false));
        assert!(!tracker.can_regenerate(false));
    }

    #[test]
    fn test_regenerate_blocked_while_in_flight() {
        let mut tracker = SelectionConstraintTracker::new();
        assert!(!tracker.regenerate(true));
        assert!(!tracker.has_regenerated());
    }

    #[test]
    fn test_reset() {
        let mut tracker = SelectionConstraintTracker::new();
        tracker.select(piece("Aria"));
        tracker.regenerate(false);
        tracker.select(piece("Borin"));

        tracker.reset();
        assert_eq!(tracker, SelectionConstraintTracker::new());
    }
}
