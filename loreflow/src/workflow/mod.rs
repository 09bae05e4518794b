//! The stage-by-stage lore workflow.
//!
//! [`StageMachine`] owns the run. It builds on two smaller pieces:
//! [`SelectionConstraintTracker`] guards the per-stage selection and the
//! single regeneration, and [`SelectedLore`] accumulates committed
//! selections in visit order.

mod accumulator;
mod context;
mod machine;
mod tracker;

#[cfg(test)]
mod machine_tests;

pub use accumulator::SelectedLore;
pub use context::WorkflowContext;
pub use machine::{StageMachine, StagePhase, StageProgress};
pub use tracker::SelectionConstraintTracker;
