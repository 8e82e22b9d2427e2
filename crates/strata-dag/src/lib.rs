//! Commit graph for Strata.
//!
//! Stores immutable commits in an arena keyed by content-derived id and
//! answers the history questions the rest of the engine asks: resolution,
//! ancestry, merge bases, and the entity state at any commit.

pub mod commit;
pub mod error;
pub mod graph;

pub use commit::{Commit, CommitDraft, CommitKind, Snapshot};
pub use error::{GraphError, GraphResult};
pub use graph::{Ancestors, CommitGraph, DEFAULT_CHECKPOINT_INTERVAL};
