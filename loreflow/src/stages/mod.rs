//! Stage registry.
//!
//! Stages are defined once at compile time and never change; the registry
//! only answers ordering and metadata questions about them.

mod registry;

pub use registry::{StageDescriptor, StageRegistry};
