//! Merge engine for Strata.
//!
//! Implements field-level three-way merge of building states, structured
//! conflict reports, and the synthesis of merge and squash commits. A merge
//! either produces a commit or a complete list of conflicts; it never picks a
//! winner for a field both sides changed.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod three_way;

pub use conflict::{Conflict, ConflictKind, ConflictReport};
pub use engine::{MergeEngine, MergePlan, MergeStrategy, PreparedMerge};
pub use error::{MergeError, MergeResult};
pub use three_way::{three_way, ThreeWay};
