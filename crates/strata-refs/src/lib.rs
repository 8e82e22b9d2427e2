//! Branch registry for Strata.
//!
//! Branches are named pointers into the commit graph. Advancing a tip is the
//! only mutation a live branch ever sees, and it is a compare-and-swap: the
//! caller names the tip it planned against and the registry refuses the move
//! if the branch has moved since, or if the new tip would drop history.
//!
//! Deleting a branch retires its record (status `archived`, or `merged` when
//! a pull request consumed it). Retired records stay resolvable by id and
//! their names become free for reuse.
//!
//! # Modules
//!
//! - [`branch`]: [`Branch`], [`NewBranch`], [`BranchFilter`]
//! - [`registry`]: the [`BranchRegistry`] itself
//! - [`names`]: branch name validation and issue branch naming

pub mod branch;
pub mod error;
pub mod names;
pub mod registry;

pub use branch::{Branch, BranchFilter, BranchKind, BranchStatus, NewBranch, TipUpdate};
pub use error::{RefError, Result};
pub use names::{issue_branch_name, validate_branch_name};
pub use registry::BranchRegistry;
