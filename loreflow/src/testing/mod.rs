//! Testing utilities for code driving a [`StageMachine`](crate::workflow::StageMachine).
//!
//! This module provides:
//! - A scripted in-memory backend
//! - Fixture candidates and a fixture story for every stage

mod fixtures;
mod mocks;

pub use fixtures::{candidates_for, result_for, sample_story};
pub use mocks::{ScriptStep, ScriptedBackend};
