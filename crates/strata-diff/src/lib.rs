//! Diff engine for Strata.
//!
//! Computes sparse, field-level change sets between building states.
//!
//! # Key Types
//!
//! - [`diff_entities`] / [`diff_sets`]: compare entities and whole states
//! - [`DiffEngine`]: merge-base and direct diffs between commits
//! - [`CommitDiff`]: a change set with the commits it relates

pub mod commit_diff;
pub mod entity_diff;
pub mod error;

pub use commit_diff::{CommitDiff, DiffEngine};
pub use entity_diff::{diff_entities, diff_entity, diff_over, diff_sets};
pub use error::{DiffError, DiffResult};
